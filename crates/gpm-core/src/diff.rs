//! Classification of tracked and candidate paths
//!
//! Compares one scan of the working tree against the manifest and the blob
//! store. Each path is classified exactly once; the direction of the run
//! only matters to the planner.

use std::collections::BTreeMap;
use std::path::Path;

use gpm_fs::NormalizedPath;
use serde::Serialize;

use crate::blob::BlobStore;
use crate::error::{PathError, PathFailure};
use crate::fingerprint::{self, StatInfo};
use crate::manifest::{EntryMode, Manifest, ManifestEntry};
use crate::scanner::{ScanEntry, ScanPolicy, SpecialKind};

/// Direction requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encrypt => f.write_str("encrypt"),
            Self::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Classification of a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathChange {
    /// Plaintext present, no manifest entry
    New { path: NormalizedPath, stat: StatInfo },
    /// Plaintext hash differs from the entry
    Modified { entry: ManifestEntry, stat: StatInfo },
    /// Plaintext agrees with the entry. `refreshed` carries new hints when
    /// only the stat data drifted.
    Unchanged {
        entry: ManifestEntry,
        refreshed: Option<StatInfo>,
    },
    /// Plaintext gone, blob present
    Deleted { entry: ManifestEntry },
    /// Plaintext present, blob gone
    BlobMissing { entry: ManifestEntry, stat: StatInfo },
    /// Plaintext and blob both gone
    Vanished { entry: ManifestEntry },
    /// Tombstoned entry whose plaintext is still absent
    Tombstoned { entry: ManifestEntry },
    /// Tombstoned entry whose plaintext reappeared
    Revived { entry: ManifestEntry, stat: StatInfo },
}

impl PathChange {
    pub fn path(&self) -> &NormalizedPath {
        match self {
            Self::New { path, .. } => path,
            Self::Modified { entry, .. }
            | Self::Unchanged { entry, .. }
            | Self::Deleted { entry }
            | Self::BlobMissing { entry, .. }
            | Self::Vanished { entry }
            | Self::Tombstoned { entry }
            | Self::Revived { entry, .. } => &entry.path,
        }
    }
}

/// A path left out of the plan because it is not a regular file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub path: NormalizedPath,
    pub kind: SpecialKind,
}

/// Result of a diff
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// One change per path, sorted by path
    pub changes: Vec<PathChange>,
    pub excluded: Vec<Exclusion>,
    /// Tracked paths the ignore policy now hides; their entries are kept
    pub ignored: Vec<NormalizedPath>,
    /// Paths that could not be read or hashed
    pub failures: Vec<PathFailure>,
}

/// Compares scan results with the manifest
pub struct DiffEngine<'a> {
    root: &'a Path,
    store: &'a BlobStore,
    policy: Option<&'a ScanPolicy>,
}

impl<'a> DiffEngine<'a> {
    pub fn new(root: &'a Path, store: &'a BlobStore) -> Self {
        Self {
            root,
            store,
            policy: None,
        }
    }

    /// Leave entries alone when the scan that produced the results could
    /// not have seen them.
    pub fn with_policy(mut self, policy: &'a ScanPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn diff(&self, manifest: &Manifest, scan: impl IntoIterator<Item = ScanEntry>) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();
        let mut files: BTreeMap<NormalizedPath, StatInfo> = BTreeMap::new();
        let mut specials: BTreeMap<NormalizedPath, SpecialKind> = BTreeMap::new();
        let mut unreadable: Vec<NormalizedPath> = Vec::new();

        for item in scan {
            match item {
                ScanEntry::File { path, stat } => {
                    files.insert(path, stat);
                }
                ScanEntry::Special { path, kind } => {
                    specials.insert(path, kind);
                }
                ScanEntry::Unreadable { path, message } => {
                    outcome
                        .failures
                        .push(PathFailure::new(path.clone(), &PathError::Scan(message)));
                    unreadable.push(path);
                }
            }
        }

        for entry in manifest.entries() {
            if unreadable.iter().any(|blocked| entry.path.starts_with(blocked)) {
                tracing::debug!(path = %entry.path, "Entry under unreadable path left untouched");
                continue;
            }
            if specials.contains_key(&entry.path) {
                // Reported with the other specials below.
                continue;
            }
            if self.policy.is_some_and(|policy| policy.covers(&entry.path)) {
                tracing::warn!(path = %entry.path, "Tracked path is ignored, leaving its entry untouched");
                outcome.ignored.push(entry.path.clone());
                continue;
            }

            let plaintext = files.remove(&entry.path);
            if let Some(change) = self.classify(entry, plaintext, &mut outcome.failures) {
                tracing::debug!(path = %entry.path, change = change_label(&change), "Classified");
                outcome.changes.push(change);
            }
        }

        for (path, stat) in files {
            tracing::debug!(path = %path, "Classified new path");
            outcome.changes.push(PathChange::New { path, stat });
        }

        for (path, kind) in specials {
            tracing::warn!(path = %path, kind = %kind, "Skipping non-regular file");
            outcome.excluded.push(Exclusion { path, kind });
        }

        outcome.changes.sort_by(|a, b| a.path().cmp(b.path()));
        outcome
    }

    fn classify(
        &self,
        entry: &ManifestEntry,
        plaintext: Option<StatInfo>,
        failures: &mut Vec<PathFailure>,
    ) -> Option<PathChange> {
        let entry = entry.clone();

        if entry.mode == EntryMode::Tombstoned {
            return Some(match plaintext {
                Some(stat) => PathChange::Revived { entry, stat },
                None => PathChange::Tombstoned { entry },
            });
        }

        let blob_present = self.store.contains(&entry.blob_id);
        let stat = match (plaintext, blob_present) {
            (None, true) => return Some(PathChange::Deleted { entry }),
            (None, false) => return Some(PathChange::Vanished { entry }),
            (Some(stat), false) => return Some(PathChange::BlobMissing { entry, stat }),
            (Some(stat), true) => stat,
        };

        if !fingerprint::may_have_changed(&entry, &stat) {
            let refreshed = entry.mode.is_pending().then_some(stat);
            return Some(PathChange::Unchanged { entry, refreshed });
        }

        let native = self.root.join(entry.path.to_native());
        match fingerprint::fingerprint_file(&native) {
            Ok(fp) if fingerprint::has_changed(&entry, &fp) => Some(PathChange::Modified {
                entry,
                stat: fp.stat,
            }),
            Ok(fp) => {
                let refreshed =
                    (fp.stat != entry.stat() || entry.mode.is_pending()).then_some(fp.stat);
                Some(PathChange::Unchanged { entry, refreshed })
            }
            Err(e) => {
                tracing::warn!(path = %entry.path, error = %e, "Could not hash file");
                failures.push(PathFailure::new(entry.path, &PathError::Scan(e.to_string())));
                None
            }
        }
    }
}

fn change_label(change: &PathChange) -> &'static str {
    match change {
        PathChange::New { .. } => "new",
        PathChange::Modified { .. } => "modified",
        PathChange::Unchanged { .. } => "unchanged",
        PathChange::Deleted { .. } => "deleted",
        PathChange::BlobMissing { .. } => "blob-missing",
        PathChange::Vanished { .. } => "vanished",
        PathChange::Tombstoned { .. } => "tombstoned",
        PathChange::Revived { .. } => "revived",
    }
}
