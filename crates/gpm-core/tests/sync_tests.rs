//! End-to-end sync scenarios over temporary working trees.

use std::fs;
use std::sync::Arc;

use gpm_core::{
    Direction, EntryMode, Error, FailureKind, Manifest, ManifestEntry, ManifestStore,
    NativeAdapter, RecipientConfig, SkipReason, SyncEngine, SyncOptions,
};
use gpm_fs::NormalizedPath;
use gpm_test_utils::{FailingAdapter, TestTree, XorAdapter};
use pretty_assertions::assert_eq;

fn load_manifest(tree: &TestTree, engine: &SyncEngine) -> Manifest {
    ManifestStore::new(engine.layout(), tree.config().robustness())
        .load()
        .unwrap()
}

fn entry(manifest: &Manifest, path: &str) -> Option<ManifestEntry> {
    manifest.get(&NormalizedPath::new(path)).cloned()
}

fn sorted(mut actions: Vec<String>) -> Vec<String> {
    actions.sort();
    actions
}

#[test]
fn second_encrypt_without_changes_does_nothing() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    tree.write("docs/b.md", "bravo");
    let adapter = Arc::new(XorAdapter::new());
    let engine = tree.engine(adapter.clone());

    let first = engine.sync(Direction::Encrypt).unwrap();
    assert!(first.success(), "{:?}", first.failures);
    assert_eq!(first.summary.processed, 2);
    assert_eq!(tree.blob_count(), 2);
    assert!(tree.snapshot_exists());
    // Two files plus the manifest snapshot.
    assert_eq!(adapter.encrypt_calls(), 3);

    let second = engine.sync(Direction::Encrypt).unwrap();
    assert!(second.actions.is_empty(), "{:?}", second.actions);
    assert_eq!(second.summary.processed, 0);
    assert_eq!(second.summary.skipped, 2);
    assert_eq!(adapter.encrypt_calls(), 3);
    assert!(engine.plan(Direction::Encrypt).unwrap().is_empty());
}

#[test]
fn decrypt_restores_identical_bytes() {
    let tree = TestTree::new();
    let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    tree.write("bin/data.bin", &binary);
    tree.write("empty.txt", "");
    tree.write("deep/nested/dir/note.txt", "hello\r\nworld\n");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();

    tree.remove("bin/data.bin");
    tree.remove("empty.txt");
    tree.remove("deep/nested/dir/note.txt");

    let report = engine.sync(Direction::Decrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    assert_eq!(report.summary.processed, 3);
    assert_eq!(fs::read(tree.path("bin/data.bin")).unwrap(), binary);
    tree.assert_content("empty.txt", "");
    tree.assert_content("deep/nested/dir/note.txt", "hello\r\nworld\n");

    let again = engine.sync(Direction::Decrypt).unwrap();
    assert!(again.actions.is_empty(), "{:?}", again.actions);
}

#[test]
fn touching_a_file_does_not_reencrypt_it() {
    let tree = TestTree::new();
    tree.write("a.txt", "unchanged bytes");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    let blobs = tree.blob_ids();

    tree.touch("a.txt");
    let plan = engine.plan(Direction::Encrypt).unwrap();
    assert!(plan.actions.is_empty());
    assert_eq!(plan.refreshes.len(), 1);

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    assert_eq!(tree.blob_ids(), blobs);

    // The refreshed hints let the next run skip hashing altogether.
    let plan = engine.plan(Direction::Encrypt).unwrap();
    assert!(plan.refreshes.is_empty());
}

#[test]
fn deleting_plaintext_removes_blob_and_entry() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    tree.write("b.txt", "bravo");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();

    tree.remove("a.txt");
    let report = engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(report.actions, vec!["Deleted blob of a.txt".to_string()]);
    assert_eq!(tree.blob_count(), 1);

    let manifest = load_manifest(&tree, &engine);
    assert!(entry(&manifest, "a.txt").is_none());
    assert!(entry(&manifest, "b.txt").is_some());
}

#[test]
fn decrypt_does_not_resurrect_path_whose_blob_is_gone() {
    let tree = TestTree::new();
    tree.write("keep.txt", "keep");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    let before = tree.blob_ids();

    tree.write("gone.txt", "gone");
    engine.sync(Direction::Encrypt).unwrap();
    let gone_blob = tree
        .blob_ids()
        .into_iter()
        .find(|id| !before.contains(id))
        .unwrap();

    tree.remove("gone.txt");
    tree.blob_store().delete(&gone_blob).unwrap();

    let report = engine.sync(Direction::Decrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    assert_eq!(report.actions, vec!["Forgot gone.txt".to_string()]);
    assert!(!tree.exists("gone.txt"));
    assert!(entry(&load_manifest(&tree, &engine), "gone.txt").is_none());
}

#[test]
fn failing_path_does_not_block_the_rest() {
    let tree = TestTree::new();
    tree.write("good1.txt", "fine");
    tree.write("good2.txt", "also fine");
    tree.write("bad.txt", "ok for now");
    let adapter = Arc::new(FailingAdapter::new("POISON"));
    let engine = tree.engine(adapter.clone());
    engine.sync(Direction::Encrypt).unwrap();
    let before = entry(&load_manifest(&tree, &engine), "bad.txt").unwrap();

    tree.write("good1.txt", "fine, edited");
    tree.write("bad.txt", "now with POISON inside");
    tree.write("new.txt", "brand new");

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(!report.success());
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.processed, 2);
    assert_eq!(report.failures[0].path.as_str(), "bad.txt");
    assert_eq!(report.failures[0].kind, FailureKind::Adapter);

    let manifest = load_manifest(&tree, &engine);
    assert_eq!(entry(&manifest, "bad.txt").unwrap(), before);
    assert!(entry(&manifest, "new.txt").is_some());
    assert_ne!(
        entry(&manifest, "good1.txt").unwrap().content_hash,
        entry(&manifest, "good2.txt").unwrap().content_hash
    );
}

#[test]
fn new_unchanged_and_modified_paths() {
    let tree = TestTree::new();
    tree.write("b.txt", "bravo");
    tree.write("c.txt", "charlie");
    let adapter = Arc::new(XorAdapter::new());
    let engine = tree.engine(adapter.clone());
    engine.sync(Direction::Encrypt).unwrap();

    let before = load_manifest(&tree, &engine);
    let b_blob = entry(&before, "b.txt").unwrap().blob_id;
    let c_blob = entry(&before, "c.txt").unwrap().blob_id;
    let b_bytes = tree.blob_store().get(&b_blob).unwrap();

    tree.write("a.txt", "alpha");
    tree.write("c.txt", "charlie, revised");
    adapter.reset_counts();

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    assert_eq!(
        sorted(report.actions),
        vec!["Encrypted a.txt".to_string(), "Encrypted c.txt".to_string()]
    );
    // a.txt, c.txt and the manifest snapshot.
    assert_eq!(adapter.encrypt_calls(), 3);

    let after = load_manifest(&tree, &engine);
    let store = tree.blob_store();
    assert_eq!(store.get(&b_blob).unwrap(), b_bytes);
    assert!(!store.contains(&c_blob));
    assert!(store.contains(&entry(&after, "a.txt").unwrap().blob_id));
    assert!(store.contains(&entry(&after, "c.txt").unwrap().blob_id));

    let changed: Vec<_> = after
        .entries()
        .filter(|e| entry(&before, e.path.as_str()).as_ref() != Some(*e))
        .map(|e| e.path.to_string())
        .collect();
    assert_eq!(changed, vec!["a.txt".to_string(), "c.txt".to_string()]);
}

#[test]
fn shared_blob_survives_until_last_reference_goes() {
    let tree = TestTree::new();
    tree.write("x.txt", "same content");
    tree.write("y.txt", "same content");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(tree.blob_count(), 1);

    tree.remove("x.txt");
    let report = engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(
        report.actions,
        vec!["Removed x.txt (blob still shared)".to_string()]
    );
    assert_eq!(tree.blob_count(), 1);
    assert!(entry(&load_manifest(&tree, &engine), "x.txt").is_none());

    tree.remove("y.txt");
    engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(tree.blob_count(), 0);
}

#[test]
fn modifying_one_sharer_keeps_the_other_blob() {
    let tree = TestTree::new();
    tree.write("x.txt", "same content");
    tree.write("y.txt", "same content");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    let shared = tree.blob_ids();

    tree.write("x.txt", "x diverged");
    engine.sync(Direction::Encrypt).unwrap();

    let store = tree.blob_store();
    assert!(store.contains(&shared[0]));
    assert_eq!(tree.blob_count(), 2);

    tree.remove("y.txt");
    engine.sync(Direction::Decrypt).unwrap();
    tree.assert_content("y.txt", "same content");
}

#[test]
fn identical_content_reuses_existing_blob() {
    let tree = TestTree::new();
    tree.write("a.txt", "payload");
    let adapter = Arc::new(XorAdapter::new());
    let engine = tree.engine(adapter.clone());
    engine.sync(Direction::Encrypt).unwrap();
    adapter.reset_counts();

    tree.write("copy.txt", "payload");
    let report = engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(report.reused, 1);
    assert_eq!(
        report.actions,
        vec!["Encrypted copy.txt (reused existing blob)".to_string()]
    );
    // Only the snapshot needed the adapter.
    assert_eq!(adapter.encrypt_calls(), 1);
}

#[test]
fn corrupt_manifest_aborts_before_any_action() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let adapter = Arc::new(XorAdapter::new());
    let engine = tree.engine(adapter.clone());
    engine.sync(Direction::Encrypt).unwrap();

    tree.write(".gpm/manifest.toml", "this is [not valid toml");
    tree.write("b.txt", "bravo");
    adapter.reset_counts();

    let err = engine.sync(Direction::Encrypt).unwrap_err();
    assert!(matches!(err, Error::ManifestCorrupt { .. }), "{err}");
    assert_eq!(adapter.encrypt_calls(), 0);
    assert_eq!(tree.blob_count(), 1);
    assert_eq!(tree.read(".gpm/manifest.toml"), "this is [not valid toml");
}

#[test]
fn missing_blob_is_recreated_on_encrypt_and_skipped_on_decrypt() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    let id = tree.blob_ids().remove(0);
    tree.blob_store().delete(&id).unwrap();

    let plan = engine.plan(Direction::Decrypt).unwrap();
    assert!(plan.actions.is_empty());
    assert_eq!(plan.skipped[0].reason, SkipReason::BlobMissing);

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(report.actions, vec!["Encrypted a.txt".to_string()]);
    assert!(tree.blob_store().contains(&id));
}

#[test]
fn fresh_clone_decrypts_from_snapshot() {
    let origin = TestTree::new();
    origin.write("a.txt", "alpha");
    origin.write("dir/b.txt", "bravo");
    origin
        .engine(Arc::new(XorAdapter::new()))
        .sync(Direction::Encrypt)
        .unwrap();

    let clone = origin.clone_published();
    assert!(!clone.exists(".gpm/manifest.toml"));
    let report = clone
        .engine(Arc::new(XorAdapter::new()))
        .sync(Direction::Decrypt)
        .unwrap();
    assert!(report.success(), "{:?}", report.failures);
    clone.assert_content("a.txt", "alpha");
    clone.assert_content("dir/b.txt", "bravo");
    assert!(clone.exists(".gpm/manifest.toml"));
}

fn published_origin() -> TestTree {
    let origin = TestTree::new();
    origin.write("a.txt", "alpha");
    origin.write("b.txt", "bravo");
    origin
        .engine(Arc::new(XorAdapter::new()))
        .sync(Direction::Encrypt)
        .unwrap();
    origin
}

#[test]
fn encrypt_on_fresh_clone_keeps_published_blobs() {
    let origin = published_origin();
    let clone = origin.clone_published();
    let engine = clone.engine(Arc::new(XorAdapter::new()));

    let plan = engine.plan(Direction::Encrypt).unwrap();
    assert!(plan.actions.is_empty(), "{:?}", plan.actions);
    assert_eq!(plan.skipped.len(), 2);
    assert!(plan.skipped.iter().all(|s| s.reason == SkipReason::AwaitingDecrypt));

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    assert_eq!(clone.blob_count(), 2);
    let manifest = load_manifest(&clone, &engine);
    assert_eq!(entry(&manifest, "a.txt").unwrap().mode, EntryMode::DecryptPending);

    let report = engine.sync(Direction::Decrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    clone.assert_content("a.txt", "alpha");
    clone.assert_content("b.txt", "bravo");
    let manifest = load_manifest(&clone, &engine);
    assert_eq!(entry(&manifest, "a.txt").unwrap().mode, EntryMode::Synced);
}

#[test]
fn encrypt_after_cancelled_decrypt_keeps_pending_blobs() {
    let origin = published_origin();
    let clone = origin.clone_published();

    let cancelled = clone.engine(Arc::new(XorAdapter::new()));
    cancelled.cancel_token().cancel();
    let report = cancelled.sync(Direction::Decrypt).unwrap();
    assert!(report.cancelled);
    assert_eq!(report.pending, 2);

    let engine = clone.engine(Arc::new(XorAdapter::new()));
    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    assert_eq!(clone.blob_count(), 2);

    engine.sync(Direction::Decrypt).unwrap();
    clone.assert_content("a.txt", "alpha");
    clone.assert_content("b.txt", "bravo");
}

#[test]
fn encrypt_after_failed_decrypt_keeps_the_blob() {
    let origin = published_origin();
    let origin_engine = origin.engine(Arc::new(XorAdapter::new()));
    let published = load_manifest(&origin, &origin_engine);
    let a = entry(&published, "a.txt").unwrap();
    let b = entry(&published, "b.txt").unwrap();

    let clone = origin.clone_published();
    let store = clone.blob_store();
    let original_a = store.get(&a.blob_id).unwrap();
    store.put(&a.blob_id, &store.get(&b.blob_id).unwrap()).unwrap();

    let engine = clone.engine(Arc::new(XorAdapter::new()));
    let report = engine.sync(Direction::Decrypt).unwrap();
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.failures[0].kind, FailureKind::Integrity);
    let manifest = load_manifest(&clone, &engine);
    let failed = entry(&manifest, "a.txt").unwrap();
    assert_eq!(failed.mode, EntryMode::DecryptPending);
    assert_eq!(failed.content_hash, a.content_hash);

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    assert!(clone.blob_store().contains(&a.blob_id));

    store.put(&a.blob_id, &original_a).unwrap();
    let report = engine.sync(Direction::Decrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    clone.assert_content("a.txt", "alpha");
}

#[test]
fn empty_passphrase_is_fatal_before_any_action() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    tree.write("b.txt", "bravo");
    let engine = SyncEngine::new(
        tree.root(),
        tree.config(),
        Arc::new(NativeAdapter::new()),
        RecipientConfig::passphrase(""),
    )
    .unwrap();

    let err = engine.sync(Direction::Encrypt).unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "{err}");
    assert!(err.to_string().contains("passphrase"), "{err}");
    assert_eq!(tree.blob_count(), 0);
    assert!(!tree.snapshot_exists());
    assert!(!tree.exists(".gpm/manifest.toml"));
    assert!(matches!(engine.gc(true), Err(Error::Config { .. })));
}

#[test]
fn snapshot_with_wrong_passphrase_is_fatal() {
    let origin = TestTree::new();
    origin.write("a.txt", "alpha");
    origin
        .engine(Arc::new(XorAdapter::new()))
        .sync(Direction::Encrypt)
        .unwrap();

    let clone = origin.clone_published();
    let engine = SyncEngine::new(
        clone.root(),
        clone.config(),
        Arc::new(XorAdapter::new()),
        RecipientConfig::passphrase("not the passphrase"),
    )
    .unwrap();
    let err = engine.sync(Direction::Decrypt).unwrap_err();
    assert!(matches!(err, Error::SnapshotUnreadable { .. }), "{err}");
    assert!(!clone.exists("a.txt"));
}

#[test]
fn encrypt_refuses_newer_snapshot_until_decrypted() {
    let first = TestTree::new();
    first.write("shared.txt", "version one");
    let first_engine = first.engine(Arc::new(XorAdapter::new()));
    first_engine.sync(Direction::Encrypt).unwrap();

    let second = first.clone_published();
    let second_engine = second.engine(Arc::new(XorAdapter::new()));
    second_engine.sync(Direction::Decrypt).unwrap();
    second.write("shared.txt", "version two, edited elsewhere");
    second.write("extra.txt", "from the second machine");
    second_engine.sync(Direction::Encrypt).unwrap();

    first.pull_published_from(&second);
    let err = first_engine.sync(Direction::Encrypt).unwrap_err();
    assert!(matches!(err, Error::SnapshotAhead { .. }), "{err}");

    let report = first_engine.sync(Direction::Decrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    first.assert_content("shared.txt", "version two, edited elsewhere");
    first.assert_content("extra.txt", "from the second machine");

    let report = first_engine.sync(Direction::Encrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
}

fn tombstone(tree: &TestTree, path: &str) {
    let text = tree.manifest_text();
    let marker = format!("path = \"{}\"", path);
    let start = text.find(&marker).unwrap();
    let (head, tail) = text.split_at(start);
    let tail = tail.replacen("mode = \"synced\"", "mode = \"tombstoned\"", 1);
    tree.write(".gpm/manifest.toml", format!("{head}{tail}"));
}

#[test]
fn decrypt_never_restores_a_tombstoned_path() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    tree.remove("a.txt");
    tombstone(&tree, "a.txt");

    let plan = engine.plan(Direction::Decrypt).unwrap();
    assert!(plan.actions.is_empty());
    assert_eq!(plan.skipped[0].reason, SkipReason::Tombstoned);

    engine.sync(Direction::Decrypt).unwrap();
    assert!(!tree.exists("a.txt"));

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(report.actions, vec!["Deleted blob of a.txt".to_string()]);
    assert_eq!(tree.blob_count(), 0);
    assert!(load_manifest(&tree, &engine).is_empty());
}

#[test]
fn tombstoned_path_that_reappears_is_revived() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    tombstone(&tree, "a.txt");

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert_eq!(
        report.actions,
        vec!["Encrypted a.txt (reused existing blob)".to_string()]
    );
    let revived = entry(&load_manifest(&tree, &engine), "a.txt").unwrap();
    assert_eq!(revived.mode, EntryMode::Synced);
    assert_eq!(tree.blob_count(), 1);
}

#[test]
fn cancelled_run_marks_unstarted_work_pending() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();
    let before = entry(&load_manifest(&tree, &engine), "a.txt").unwrap();

    tree.write("a.txt", "alpha, changed");
    tree.write("b.txt", "bravo");
    engine.cancel_token().cancel();

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.cancelled);
    assert!(!report.success());
    assert_eq!(report.pending, 2);
    assert!(report.gc.is_none());

    let pending = entry(&load_manifest(&tree, &engine), "a.txt").unwrap();
    assert_eq!(pending.mode, EntryMode::EncryptPending);
    assert_eq!(pending.content_hash, before.content_hash);
    assert_eq!(pending.blob_id, before.blob_id);

    let resumed = tree.engine(Arc::new(XorAdapter::new()));
    let report = resumed.sync(Direction::Encrypt).unwrap();
    assert!(report.success(), "{:?}", report.failures);
    assert_eq!(
        sorted(report.actions),
        vec!["Encrypted a.txt".to_string(), "Encrypted b.txt".to_string()]
    );
    let manifest = load_manifest(&tree, &resumed);
    assert_eq!(entry(&manifest, "a.txt").unwrap().mode, EntryMode::Synced);
}

#[test]
fn ignored_and_vcs_paths_are_never_encrypted() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    tree.write("debug.log", "noise");
    tree.write("sub/trace.log", "noise");
    tree.write("build/out.bin", "artifact");
    tree.write(".git/config", "[core]");
    tree.write("worktree/.git", "gitdir: elsewhere");
    tree.write("worktree/file.txt", "tracked");

    let mut config = tree.config();
    config.scan.ignore = vec!["*.log".to_string(), "build".to_string()];
    let engine = tree.engine_with(Arc::new(XorAdapter::new()), config);
    engine.sync(Direction::Encrypt).unwrap();

    let manifest = load_manifest(&tree, &engine);
    let paths: Vec<_> = manifest.entries().map(|e| e.path.to_string()).collect();
    assert_eq!(paths, vec!["a.txt".to_string(), "worktree/file.txt".to_string()]);
}

#[test]
fn newly_ignored_tracked_path_keeps_blob_and_local_edits() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    tree.write("notes.log", "first notes");
    tree.engine(Arc::new(XorAdapter::new()))
        .sync(Direction::Encrypt)
        .unwrap();

    let mut config = tree.config();
    config.scan.ignore = vec!["*.log".to_string()];
    let engine = tree.engine_with(Arc::new(XorAdapter::new()), config);

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    assert_eq!(tree.blob_count(), 2);
    assert!(entry(&load_manifest(&tree, &engine), "notes.log").is_some());

    tree.write("notes.log", "edited after ignoring");
    let plan = engine.plan(Direction::Decrypt).unwrap();
    assert!(plan.skipped.iter().any(|s| s.path.as_str() == "notes.log" && s.reason == SkipReason::Ignored));
    let report = engine.sync(Direction::Decrypt).unwrap();
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    tree.assert_content("notes.log", "edited after ignoring");
}

#[test]
fn relocated_data_dir_inside_tree_is_not_scanned() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let mut config = tree.config();
    config.store.output = Some("published".to_string());
    let engine = tree.engine_with(Arc::new(XorAdapter::new()), config);

    engine.sync(Direction::Encrypt).unwrap();
    assert!(tree.path("published/manifest.enc").is_file());
    assert!(tree.path("published/objects").is_dir());

    let report = engine.sync(Direction::Encrypt).unwrap();
    assert!(report.actions.is_empty(), "{:?}", report.actions);
    assert_eq!(load_manifest(&tree, &engine).len(), 1);
}

#[cfg(unix)]
#[test]
fn symlinks_are_reported_and_left_alone() {
    use gpm_core::SpecialKind;

    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    std::os::unix::fs::symlink(tree.path("a.txt"), tree.path("link.txt")).unwrap();
    let engine = tree.engine(Arc::new(XorAdapter::new()));

    let plan = engine.plan(Direction::Encrypt).unwrap();
    assert!(
        plan.skipped
            .iter()
            .any(|s| s.path.as_str() == "link.txt" && s.reason == SkipReason::Special(SpecialKind::Symlink))
    );

    engine.sync(Direction::Encrypt).unwrap();
    assert!(entry(&load_manifest(&tree, &engine), "link.txt").is_none());
}

#[test]
fn decrypt_overwrites_local_edits() {
    let tree = TestTree::new();
    tree.write("a.txt", "synced version");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();

    tree.write("a.txt", "local edit that was never encrypted");
    let report = engine.sync(Direction::Decrypt).unwrap();
    assert_eq!(report.actions, vec!["Decrypted a.txt".to_string()]);
    tree.assert_content("a.txt", "synced version");
}

#[test]
fn tampered_blob_fails_integrity_check() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    tree.write("b.txt", "bravo");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    engine.sync(Direction::Encrypt).unwrap();

    let manifest = load_manifest(&tree, &engine);
    let a = entry(&manifest, "a.txt").unwrap();
    let b = entry(&manifest, "b.txt").unwrap();
    let store = tree.blob_store();
    store.put(&a.blob_id, &store.get(&b.blob_id).unwrap()).unwrap();
    tree.remove("a.txt");

    let report = engine.sync(Direction::Decrypt).unwrap();
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.failures[0].kind, FailureKind::Integrity);
    assert!(!tree.exists("a.txt"));
}

#[test]
fn dry_run_changes_nothing() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let adapter = Arc::new(XorAdapter::new());
    let engine = tree.engine(adapter.clone());

    let report = engine
        .sync_with_options(
            Direction::Encrypt,
            SyncOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.actions, vec!["[dry-run] Would encrypt a.txt".to_string()]);
    assert_eq!(adapter.encrypt_calls(), 0);
    assert_eq!(tree.blob_count(), 0);
    assert!(!tree.exists(".gpm/manifest.toml"));
}

#[test]
fn concurrent_run_is_locked_out() {
    let tree = TestTree::new();
    tree.write("a.txt", "alpha");
    let engine = tree.engine(Arc::new(XorAdapter::new()));
    let _held = ManifestStore::new(engine.layout(), tree.config().robustness())
        .lock()
        .unwrap();

    let err = engine.sync(Direction::Encrypt).unwrap_err();
    assert!(matches!(err, Error::Locked { .. }), "{err}");
}

#[test]
fn engine_requires_initialized_tree() {
    let tree = TestTree::uninitialized();
    let result = SyncEngine::new(
        tree.root(),
        tree.config(),
        Arc::new(XorAdapter::new()),
        RecipientConfig::passphrase("x"),
    );
    assert!(matches!(result, Err(Error::NotInitialized { .. })));
}
