use gpm_fs::NormalizedPath;

#[test]
fn test_path_traversal_mitigation() {
    let base = NormalizedPath::new("/var/www");
    let joined = base.join("../../etc/passwd");

    assert_ne!(joined.as_str(), "/var/www/../../etc/passwd");
    assert_eq!(joined.as_str(), "/etc/passwd");
    assert!(
        !joined.starts_with(&base),
        "Resolved path correctly fails starts_with check"
    );
}

#[test]
fn test_relative_path_sandboxing() {
    let path = NormalizedPath::new("../outside.txt");
    assert_eq!(path.as_str(), "outside.txt");

    let path2 = NormalizedPath::new("a/../../b");
    assert_eq!(path2.as_str(), "b");
}

#[test]
#[cfg(unix)]
fn test_ensure_no_symlinks_rejects_linked_directory() {
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    let link = dir.path().join("link");
    symlink(outside.path(), &link).unwrap();

    let target = link.join("file.txt");
    let result = gpm_fs::io::ensure_no_symlinks(dir.path(), &target);
    assert!(matches!(result, Err(gpm_fs::Error::SymlinkInPath { .. })));
}

#[test]
fn test_ensure_no_symlinks_accepts_missing_components() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("new/dir/file.txt");
    assert!(gpm_fs::io::ensure_no_symlinks(dir.path(), &target).is_ok());
}

#[test]
fn test_ensure_no_symlinks_rejects_target_outside_root() {
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let result = gpm_fs::io::ensure_no_symlinks(dir.path(), &other.path().join("x"));
    assert!(matches!(result, Err(gpm_fs::Error::PathEscapesRoot { .. })));
}
