//! SyncEngine implementation
//!
//! The SyncEngine coordinates state between the manifest (what was last
//! synced), the working tree (plaintext) and the blob store (ciphertext).
//! A run is: lock, load, scan, diff, plan, execute, release, save.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use gpm_fs::{GpmPath, NormalizedPath};

use crate::adapter::{EncryptionAdapter, RecipientConfig};
use crate::blob::{BlobId, BlobStore};
use crate::config::GpmConfig;
use crate::diff::{DiffEngine, Direction};
use crate::error::{FailureKind, PathError, PathFailure};
use crate::layout::RepoLayout;
use crate::manifest::{EntryMode, Manifest, ManifestEntry, ManifestStore};
use crate::plan::{self, Action, SkipReason, Skipped, SyncPlan};
use crate::scanner::{ScanPolicy, TreeScanner};
use crate::{Error, Result};

use super::executor::{self, CancelToken, Job, Outcome, Worker};
use super::report::{GcReport, SyncReport};

/// Options for sync operations
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// If true, plan without modifying anything.
    /// Actions are reported prefixed with "[dry-run] Would ..."
    pub dry_run: bool,
    /// Override `engine.prune_orphans` for this run
    pub prune_orphans: Option<bool>,
}

/// Engine for synchronizing a working tree with its encrypted store
///
/// The SyncEngine provides three main operations:
/// - **plan**: classify every path without changing anything
/// - **sync**: encrypt or decrypt whatever changed since the last run
/// - **gc**: delete blobs no manifest entry references
pub struct SyncEngine {
    layout: RepoLayout,
    config: GpmConfig,
    adapter: Arc<dyn EncryptionAdapter>,
    recipient: RecipientConfig,
    cancel: CancelToken,
}

impl SyncEngine {
    /// Create a new SyncEngine for the working tree at `root`.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid, `NotInitialized` if the
    /// tree has no `.gpm` directory.
    pub fn new(
        root: impl AsRef<Path>,
        config: GpmConfig,
        adapter: Arc<dyn EncryptionAdapter>,
        recipient: RecipientConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref();
        let root = dunce::canonicalize(root).map_err(|e| gpm_fs::Error::io(root, e))?;
        let layout = RepoLayout::new(&root, config.output().as_deref());
        if !layout.is_initialized() {
            return Err(Error::NotInitialized { path: root });
        }

        Ok(Self {
            layout,
            config,
            adapter,
            recipient,
            cancel: CancelToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn config(&self) -> &GpmConfig {
        &self.config
    }

    fn check_recipient(&self) -> Result<()> {
        self.adapter.check_recipient(&self.recipient).map_err(|e| {
            Error::config(format!("No usable key for adapter '{}': {}", self.adapter.name(), e))
        })
    }

    fn blob_store(&self) -> BlobStore {
        BlobStore::open(self.layout.data_dir(), self.config.engine.fsync)
    }

    fn manifest_store(&self) -> ManifestStore {
        ManifestStore::new(&self.layout, self.config.robustness())
    }

    fn scanner(&self) -> Result<TreeScanner> {
        let data_dir = self.layout.data_dir();
        let data_dir = dunce::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
        let policy = ScanPolicy::new(&self.config.scan.ignore)?.exclude_dir(data_dir);
        Ok(TreeScanner::new(self.layout.root(), policy))
    }

    /// Plan a run without executing it.
    ///
    /// Does not take the run lock and never touches the snapshot unless the
    /// local manifest is missing.
    pub fn plan(&self, direction: Direction) -> Result<SyncPlan> {
        let store = self.blob_store();
        let manifest = self.load_manifest(&store, direction, false)?;
        self.build_plan(&manifest, &store, direction)
    }

    fn build_plan(&self, manifest: &Manifest, store: &BlobStore, direction: Direction) -> Result<SyncPlan> {
        let scanner = self.scanner()?;
        let outcome = DiffEngine::new(self.layout.root(), store)
            .with_policy(scanner.policy())
            .diff(manifest, scanner.scan());

        let mut plan = plan::plan(outcome.changes, direction);
        plan.skipped.extend(outcome.excluded.into_iter().map(|ex| Skipped {
            path: ex.path,
            reason: SkipReason::Special(ex.kind),
        }));
        plan.skipped.extend(outcome.ignored.into_iter().map(|path| Skipped {
            path,
            reason: SkipReason::Ignored,
        }));
        plan.failures = outcome.failures;
        Ok(plan)
    }

    /// Run a sync in `direction` with default options.
    pub fn sync(&self, direction: Direction) -> Result<SyncReport> {
        self.sync_with_options(direction, SyncOptions::default())
    }

    /// Run a sync.
    ///
    /// Per-path failures are collected in the report; every successfully
    /// processed path stays committed.
    ///
    /// # Errors
    ///
    /// Fatal conditions only: missing key material, lock held, corrupt
    /// manifest, unreadable or newer snapshot, invalid configuration, or
    /// failure to save the manifest at the end.
    pub fn sync_with_options(&self, direction: Direction, options: SyncOptions) -> Result<SyncReport> {
        self.check_recipient()?;
        let manifests = self.manifest_store();
        let _lock = if options.dry_run {
            None
        } else {
            Some(manifests.lock()?)
        };

        let store = self.blob_store();
        let mut manifest = self.load_manifest(&store, direction, true)?;
        let plan = self.build_plan(&manifest, &store, direction)?;

        let mut report = SyncReport::new(direction, options.dry_run);
        report.summary.skipped = plan.skipped.len();
        for failure in plan.failures {
            report.fail(failure);
        }

        if options.dry_run {
            for action in &plan.actions {
                report.actions.push(format!("[dry-run] Would {}", action));
            }
            return Ok(report);
        }

        for refresh in &plan.refreshes {
            if let Some(entry) = manifest.get(&refresh.path) {
                let updated = entry.refreshed(refresh.stat);
                manifest.insert(updated);
            }
        }

        let mut releases: BTreeSet<BlobId> = BTreeSet::new();
        let mut tombstoned: Vec<ManifestEntry> = Vec::new();
        let mut jobs = Vec::new();
        for action in plan.actions {
            match action {
                Action::Encrypt { path, previous } => jobs.push(Job::Encrypt { path, previous }),
                Action::Decrypt { entry } => jobs.push(Job::Decrypt { entry }),
                Action::Forget { entry } => {
                    tracing::info!(path = %entry.path, "Forgetting entry with no plaintext and no blob");
                    manifest.remove(&entry.path);
                    report.record(format!("Forgot {}", entry.path));
                }
                Action::DeleteBlob { entry } => {
                    manifest.set_mode(&entry.path, EntryMode::Tombstoned);
                    releases.insert(entry.blob_id.clone());
                    tombstoned.push(entry);
                }
            }
        }

        let blob_salt = manifest.blob_salt().to_string();
        let worker = Worker {
            root: self.layout.root(),
            store: &store,
            adapter: self.adapter.as_ref(),
            recipient: &self.recipient,
            blob_salt: &blob_salt,
            fsync: self.config.engine.fsync,
        };

        let checkpoint_every = self.config.engine.checkpoint_every;
        let mut applied = 0usize;
        let remaining = executor::run_pool(&worker, jobs, self.config.workers(), &self.cancel, |outcome| {
            match outcome {
                Outcome::Encrypted {
                    entry,
                    previous,
                    reused,
                } => {
                    if let Some(previous) = previous
                        && previous.blob_id != entry.blob_id
                    {
                        releases.insert(previous.blob_id);
                    }
                    let line = if reused {
                        report.reused += 1;
                        format!("Encrypted {} (reused existing blob)", entry.path)
                    } else {
                        format!("Encrypted {}", entry.path)
                    };
                    tracing::info!(path = %entry.path, blob = %entry.blob_id, reused, "Encrypted");
                    manifest.insert(entry);
                    report.record(line);
                }
                Outcome::Decrypted { entry } => {
                    tracing::info!(path = %entry.path, "Decrypted");
                    report.record(format!("Decrypted {}", entry.path));
                    manifest.insert(entry);
                }
                Outcome::Failed { path, error } => {
                    if direction == Direction::Decrypt
                        && manifest.get(&path).is_some_and(|e| e.mode.is_live())
                    {
                        manifest.set_mode(&path, EntryMode::DecryptPending);
                    }
                    report.fail(PathFailure::new(path, &error));
                }
            }

            applied += 1;
            if checkpoint_every > 0 && applied % checkpoint_every == 0 {
                match manifests.save(&mut manifest) {
                    Ok(()) => tracing::debug!(applied, "Checkpointed manifest"),
                    Err(e) => tracing::warn!(error = %e, "Checkpoint failed, continuing"),
                }
            }
        });

        if !remaining.is_empty() {
            report.cancelled = true;
            report.pending = remaining.len();
            for job in &remaining {
                let (path, mode) = match job {
                    Job::Encrypt { path, .. } => (path, EntryMode::EncryptPending),
                    Job::Decrypt { entry } => (&entry.path, EntryMode::DecryptPending),
                };
                if manifest.get(path).is_some_and(|e| e.mode.is_live()) {
                    manifest.set_mode(path, mode);
                }
            }
            tracing::warn!(pending = remaining.len(), "Run cancelled, unstarted actions left pending");
        }

        self.release(&mut manifest, &store, releases, tombstoned, &mut report);

        let prune = options.prune_orphans.unwrap_or(self.config.engine.prune_orphans);
        if direction == Direction::Encrypt && prune && !report.cancelled {
            report.gc = Some(self.prune_orphans(&manifest, &store, false));
        }

        manifests.save(&mut manifest)?;

        if direction == Direction::Encrypt
            && (manifest.is_ahead_of_snapshot() || !store.snapshot_path().is_file())
        {
            match self.write_snapshot(&manifest, &store) {
                Ok(()) => {
                    manifest.mark_snapshot_written();
                    manifests.save(&mut manifest)?;
                }
                Err(failure) => report.fail(failure),
            }
        }

        tracing::info!(
            direction = %direction,
            processed = report.summary.processed,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            "Sync finished"
        );
        Ok(report)
    }

    /// Delete released blobs that no live entry references any more, then
    /// settle this run's tombstones.
    fn release(
        &self,
        manifest: &mut Manifest,
        store: &BlobStore,
        releases: BTreeSet<BlobId>,
        tombstoned: Vec<ManifestEntry>,
        report: &mut SyncReport,
    ) {
        let mut deleted: BTreeSet<BlobId> = BTreeSet::new();
        let mut errors: BTreeMap<BlobId, String> = BTreeMap::new();
        for id in releases {
            if manifest.live_refs(&id) > 0 {
                tracing::debug!(blob = %id, "Blob still referenced, keeping it");
                continue;
            }
            match store.delete_if_present(&id) {
                Ok(_) => {
                    deleted.insert(id);
                }
                Err(e) => {
                    errors.insert(id, e.to_string());
                }
            }
        }

        for entry in tombstoned {
            match errors.get(&entry.blob_id) {
                Some(message) => report.fail(PathFailure {
                    path: entry.path,
                    kind: FailureKind::BlobStore,
                    message: message.clone(),
                }),
                None if deleted.contains(&entry.blob_id) => {
                    tracing::info!(path = %entry.path, "Deleted blob of removed path");
                    manifest.remove(&entry.path);
                    report.record(format!("Deleted blob of {}", entry.path));
                }
                None => {
                    tracing::info!(path = %entry.path, "Removed path, blob still shared");
                    manifest.remove(&entry.path);
                    report.record(format!("Removed {} (blob still shared)", entry.path));
                }
            }
        }

        for (id, message) in errors {
            tracing::warn!(blob = %id, error = %message, "Orphan blob left behind");
        }
    }

    /// Delete every blob that no manifest entry references.
    ///
    /// # Errors
    ///
    /// Fails like a sync does when the snapshot is ahead of the local
    /// manifest, since the snapshot may reference blobs unknown locally.
    pub fn gc(&self, dry_run: bool) -> Result<GcReport> {
        self.check_recipient()?;
        let manifests = self.manifest_store();
        let _lock = if dry_run { None } else { Some(manifests.lock()?) };

        if !manifests.exists() {
            tracing::warn!("No local manifest, nothing to reconcile");
            return Ok(GcReport {
                dry_run,
                ..Default::default()
            });
        }

        let store = self.blob_store();
        let manifest = self.load_manifest(&store, Direction::Encrypt, true)?;
        Ok(self.prune_orphans(&manifest, &store, dry_run))
    }

    fn prune_orphans(&self, manifest: &Manifest, store: &BlobStore, dry_run: bool) -> GcReport {
        let mut report = GcReport {
            dry_run,
            ..Default::default()
        };
        let referenced = manifest.referenced_blobs();
        let blobs = match store.list() {
            Ok(blobs) => blobs,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list blob store");
                report.failed.push(e.to_string());
                return report;
            }
        };

        for id in blobs.into_iter().filter(|id| !referenced.contains(id)) {
            if dry_run {
                report.removed.push(id);
                continue;
            }
            match store.delete_if_present(&id) {
                Ok(_) => {
                    tracing::info!(blob = %id, "Deleted orphan blob");
                    report.removed.push(id);
                }
                Err(e) => {
                    tracing::warn!(blob = %id, error = %e, "Orphan blob left behind");
                    report.failed.push(format!("{}: {}", id, e));
                }
            }
        }
        report
    }

    /// Load the local manifest, adopting the encrypted snapshot when the
    /// local one is missing or (in a decrypt run) older.
    fn load_manifest(&self, store: &BlobStore, direction: Direction, compare_snapshot: bool) -> Result<Manifest> {
        let manifests = self.manifest_store();
        let local = if manifests.exists() {
            Some(manifests.load()?)
        } else {
            None
        };
        if !compare_snapshot && let Some(local) = local {
            return Ok(local);
        }

        let snapshot_path = store.snapshot_path();
        let sealed = store.read_snapshot().map_err(|e| Error::SnapshotUnreadable {
            path: snapshot_path.clone(),
            reason: e.to_string(),
        })?;
        let Some(sealed) = sealed else {
            return Ok(local.unwrap_or_default());
        };

        let plaintext = self
            .adapter
            .decrypt(&sealed, &self.recipient)
            .map_err(|e| Error::SnapshotUnreadable {
                path: snapshot_path.clone(),
                reason: e.to_string(),
            })?;
        let content = String::from_utf8(plaintext).map_err(|e| Error::SnapshotUnreadable {
            path: snapshot_path.clone(),
            reason: e.to_string(),
        })?;
        let mut snapshot = Manifest::parse(&content, &snapshot_path)?;

        match local {
            None => {
                tracing::info!(generation = snapshot.generation(), "Adopting encrypted manifest snapshot");
                snapshot.adopt();
                Ok(snapshot)
            }
            Some(local) if snapshot.generation() > local.snapshot_generation() => match direction {
                Direction::Decrypt => {
                    tracing::info!(
                        local = local.snapshot_generation(),
                        snapshot = snapshot.generation(),
                        "Adopting newer encrypted manifest snapshot"
                    );
                    snapshot.adopt();
                    Ok(snapshot)
                }
                Direction::Encrypt => Err(Error::SnapshotAhead {
                    local: local.snapshot_generation(),
                    snapshot: snapshot.generation(),
                }),
            },
            Some(local) => Ok(local),
        }
    }

    fn write_snapshot(&self, manifest: &Manifest, store: &BlobStore) -> std::result::Result<(), PathFailure> {
        let path = NormalizedPath::new(GpmPath::ManifestSnapshot.as_str());
        let mut sealed_state = manifest.clone();
        sealed_state.mark_snapshot_written();
        let content = sealed_state.to_toml_string().map_err(|e| PathFailure {
            path: path.clone(),
            kind: FailureKind::Write,
            message: e.to_string(),
        })?;
        let sealed = self
            .adapter
            .encrypt(content.as_bytes(), &self.recipient)
            .map_err(|e| PathFailure::new(path.clone(), &PathError::Adapter(e)))?;
        store
            .write_snapshot(&sealed)
            .map_err(|e| PathFailure::new(path, &PathError::BlobStore(e)))?;
        tracing::debug!(generation = manifest.generation(), "Wrote encrypted manifest snapshot");
        Ok(())
    }
}
