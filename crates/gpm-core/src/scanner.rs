//! Working tree enumeration
//!
//! Yields every candidate path under the root exactly once per scan. The
//! state directory, the blob data directory and version control metadata
//! are pruned before descending, as is anything matching the ignore globs.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use gpm_fs::path::unrepresentable_name;
use gpm_fs::{GpmPath, NormalizedPath, VCS_METADATA_DIRS};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::fingerprint::StatInfo;
use crate::{Error, Result};

/// Kind of a non-regular path found during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialKind {
    Symlink,
    /// FIFO, socket, device or anything else that is neither file nor directory
    Other,
}

impl std::fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symlink => f.write_str("symbolic link"),
            Self::Other => f.write_str("special file"),
        }
    }
}

/// One item yielded by [`TreeScanner::scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    /// A regular file eligible for encryption
    File { path: NormalizedPath, stat: StatInfo },
    /// A symlink or special file, reported but never encrypted
    Special { path: NormalizedPath, kind: SpecialKind },
    /// A file or directory that could not be read
    Unreadable { path: NormalizedPath, message: String },
}

impl ScanEntry {
    pub fn path(&self) -> &NormalizedPath {
        match self {
            Self::File { path, .. } | Self::Special { path, .. } | Self::Unreadable { path, .. } => {
                path
            }
        }
    }
}

/// Which paths a scan skips
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    ignore: GlobSet,
    excluded_dirs: Vec<PathBuf>,
}

impl ScanPolicy {
    /// Compile the ignore globs. Each glob is matched against both the
    /// relative path and the file name.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for an invalid glob.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build ignore set: {}", e)))?;
        Ok(Self {
            ignore,
            excluded_dirs: Vec::new(),
        })
    }

    /// Additionally prune an absolute directory (e.g. a relocated data dir).
    pub fn exclude_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }

    fn is_ignored(&self, rel: &NormalizedPath) -> bool {
        if self.ignore.is_match(rel.as_str()) {
            return true;
        }
        rel.file_name().is_some_and(|name| self.ignore.is_match(name))
    }

    /// Whether a scan would skip `rel`, either by matching it directly or
    /// by pruning one of its parent directories.
    pub fn covers(&self, rel: &NormalizedPath) -> bool {
        let mut current = Some(rel.clone());
        while let Some(path) = current {
            if VCS_METADATA_DIRS.contains(&path.file_name().unwrap_or_default()) || self.is_ignored(&path) {
                return true;
            }
            current = path.parent();
        }
        false
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            ignore: GlobSet::empty(),
            excluded_dirs: Vec::new(),
        }
    }
}

enum NameCheck {
    Fine,
    Bad(&'static str),
    /// A parent directory was already reported as unreadable
    UnderReported,
}

/// Lazy, restartable enumeration of a working tree
#[derive(Debug, Clone)]
pub struct TreeScanner {
    root: PathBuf,
    policy: ScanPolicy,
}

impl TreeScanner {
    pub fn new(root: impl Into<PathBuf>, policy: ScanPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    /// Start a new scan. Entries come out sorted by file name within each
    /// directory; nothing beyond "each path once" is promised.
    pub fn scan(&self) -> impl Iterator<Item = ScanEntry> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry))
            .filter_map(move |item| self.classify(item))
    }

    fn relative(&self, path: &Path) -> Option<NormalizedPath> {
        NormalizedPath::relative_to(path, &self.root)
    }

    fn name_problem(&self, entry: &DirEntry) -> NameCheck {
        if let Some(reason) = unrepresentable_name(entry.file_name()) {
            return NameCheck::Bad(reason);
        }
        let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
        let parent_is_bad = rel
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|c| unrepresentable_name(c.as_os_str()).is_some());
        if parent_is_bad {
            NameCheck::UnderReported
        } else {
            NameCheck::Fine
        }
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if VCS_METADATA_DIRS.contains(&name.as_ref()) {
            return true;
        }
        if entry.depth() == 1 && name == GpmPath::StateDir.as_str() {
            return true;
        }
        if self.policy.excluded_dirs.iter().any(|dir| entry.path() == dir) {
            return true;
        }
        match self.relative(entry.path()) {
            Some(rel) => self.policy.is_ignored(&rel),
            None => false,
        }
    }

    fn classify(&self, item: walkdir::Result<DirEntry>) -> Option<ScanEntry> {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().and_then(|p| self.relative(p))?;
                let message = err
                    .io_error()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| err.to_string());
                tracing::warn!(path = %path, error = %message, "Unreadable path excluded from scan");
                return Some(ScanEntry::Unreadable { path, message });
            }
        };

        if entry.depth() == 0 {
            return None;
        }
        let path = self.relative(entry.path())?;
        match self.name_problem(&entry) {
            NameCheck::Fine => {}
            NameCheck::UnderReported => return None,
            NameCheck::Bad(reason) => {
                tracing::warn!(path = %path, reason, "Unsupported file name excluded from scan");
                return Some(ScanEntry::Unreadable {
                    path,
                    message: reason.to_string(),
                });
            }
        }
        let file_type = entry.file_type();

        if file_type.is_dir() {
            return None;
        }
        if file_type.is_symlink() {
            return Some(ScanEntry::Special {
                path,
                kind: SpecialKind::Symlink,
            });
        }
        if !file_type.is_file() {
            return Some(ScanEntry::Special {
                path,
                kind: SpecialKind::Other,
            });
        }

        match entry.metadata().map_err(|e| e.to_string()).and_then(|m| {
            StatInfo::from_metadata(&m).map_err(|e| e.to_string())
        }) {
            Ok(stat) => Some(ScanEntry::File { path, stat }),
            Err(message) => {
                tracing::warn!(path = %path, error = %message, "Unreadable path excluded from scan");
                Some(ScanEntry::Unreadable { path, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn files(scanner: &TreeScanner) -> Vec<String> {
        scanner
            .scan()
            .filter_map(|e| match e {
                ScanEntry::File { path, .. } => Some(path.as_str().to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn ignore_globs_match_names_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("build/out.bin"), "x").unwrap();
        fs::write(dir.path().join("src/debug.log"), "x").unwrap();
        fs::write(dir.path().join("src/main.rs"), "x").unwrap();

        let policy = ScanPolicy::new(&["*.log".to_string(), "build".to_string()]).unwrap();
        let scanner = TreeScanner::new(dir.path(), policy);

        assert_eq!(files(&scanner), vec!["src/main.rs"]);
    }

    #[test]
    fn covers_paths_under_ignored_directories() {
        let policy = ScanPolicy::new(&["build".to_string(), "*.log".to_string()]).unwrap();

        assert!(policy.covers(&NormalizedPath::new("build/nested/out.bin")));
        assert!(policy.covers(&NormalizedPath::new("src/debug.log")));
        assert!(policy.covers(&NormalizedPath::new("vendor/.git/config")));
        assert!(!policy.covers(&NormalizedPath::new("src/main.rs")));
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let err = ScanPolicy::new(&["a[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn names_that_cannot_be_stored_faithfully_are_unreadable() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a\\b"), "x").unwrap();
        fs::write(dir.path().join("ok.txt"), "x").unwrap();
        let bad_dir = dir.path().join(OsStr::from_bytes(b"raw\xff"));
        fs::create_dir(&bad_dir).unwrap();
        fs::write(bad_dir.join("inner.txt"), "x").unwrap();

        let scanner = TreeScanner::new(dir.path(), ScanPolicy::default());
        let entries: Vec<_> = scanner.scan().collect();

        assert_eq!(files(&scanner), vec!["ok.txt"]);
        let unreadable: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                ScanEntry::Unreadable { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(unreadable.len(), 2, "{entries:?}");
        assert!(unreadable.contains(&"file name contains a backslash"));
        assert!(unreadable.contains(&"file name is not valid UTF-8"));
    }

    #[test]
    fn scan_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "x").unwrap();
        let scanner = TreeScanner::new(dir.path(), ScanPolicy::default());
        assert_eq!(files(&scanner), files(&scanner));
    }
}
