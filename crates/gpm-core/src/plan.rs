//! Sync planning
//!
//! Turns classified changes into an ordered action list for one direction.
//! Planning is pure: it performs no I/O and the same changes always yield
//! the same plan.

use gpm_fs::NormalizedPath;
use serde::Serialize;

use crate::diff::{Direction, PathChange};
use crate::error::PathFailure;
use crate::fingerprint::StatInfo;
use crate::manifest::{EntryMode, ManifestEntry};
use crate::scanner::SpecialKind;

/// A unit of work for a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Drop an entry whose plaintext and blob are both gone
    Forget { entry: ManifestEntry },
    /// Tombstone the entry and release its blob
    DeleteBlob { entry: ManifestEntry },
    /// Encrypt the current plaintext; `previous` is the entry being replaced
    Encrypt {
        path: NormalizedPath,
        previous: Option<ManifestEntry>,
    },
    /// Restore plaintext from the entry's blob
    Decrypt { entry: ManifestEntry },
}

impl Action {
    pub fn path(&self) -> &NormalizedPath {
        match self {
            Self::Forget { entry } | Self::DeleteBlob { entry } | Self::Decrypt { entry } => {
                &entry.path
            }
            Self::Encrypt { path, .. } => path,
        }
    }

    /// Execution order among action kinds.
    fn rank(&self) -> u8 {
        match self {
            Self::Forget { .. } => 0,
            Self::DeleteBlob { .. } => 1,
            Self::Encrypt { .. } => 2,
            Self::Decrypt { .. } => 3,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Forget { .. } => "forget",
            Self::DeleteBlob { .. } => "delete blob of",
            Self::Encrypt { .. } => "encrypt",
            Self::Decrypt { .. } => "decrypt",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.verb(), self.path())
    }
}

/// New hints for an entry whose content did not change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refresh {
    pub path: NormalizedPath,
    pub stat: StatInfo,
}

/// Why a path produced no action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Unchanged,
    /// Plaintext without a manifest entry, in a decrypt run
    Untracked,
    /// Plaintext present but its blob is gone, in a decrypt run
    BlobMissing,
    Tombstoned,
    /// Blob present but this tree never held the plaintext, in an encrypt run
    AwaitingDecrypt,
    /// Tracked path now matched by an ignore glob
    Ignored,
    Special(SpecialKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub path: NormalizedPath,
    pub reason: SkipReason,
}

/// Ordered actions plus the bookkeeping that needs no action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub direction: Direction,
    /// Forget, DeleteBlob, Encrypt, Decrypt; each group sorted by path
    pub actions: Vec<Action>,
    pub refreshes: Vec<Refresh>,
    pub skipped: Vec<Skipped>,
    /// Paths that could not be classified
    pub failures: Vec<PathFailure>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Plan the actions for `direction`.
pub fn plan(changes: Vec<PathChange>, direction: Direction) -> SyncPlan {
    let mut actions = Vec::new();
    let mut refreshes = Vec::new();
    let mut skipped = Vec::new();

    let mut skip = |path: &NormalizedPath, reason| {
        skipped.push(Skipped {
            path: path.clone(),
            reason,
        })
    };

    for change in changes {
        match (direction, change) {
            (_, PathChange::Unchanged { entry, refreshed }) => {
                skip(&entry.path, SkipReason::Unchanged);
                if let Some(stat) = refreshed {
                    refreshes.push(Refresh {
                        path: entry.path,
                        stat,
                    });
                }
            }
            (_, PathChange::Vanished { entry }) => actions.push(Action::Forget { entry }),

            (Direction::Encrypt, PathChange::New { path, .. }) => {
                actions.push(Action::Encrypt {
                    path,
                    previous: None,
                })
            }
            (Direction::Encrypt, PathChange::Modified { entry, .. })
            | (Direction::Encrypt, PathChange::BlobMissing { entry, .. })
            | (Direction::Encrypt, PathChange::Revived { entry, .. }) => {
                actions.push(Action::Encrypt {
                    path: entry.path.clone(),
                    previous: Some(entry),
                })
            }
            (Direction::Encrypt, PathChange::Deleted { entry })
                if entry.mode == EntryMode::DecryptPending =>
            {
                tracing::debug!(path = %entry.path, "Plaintext never decrypted here, keeping blob");
                skip(&entry.path, SkipReason::AwaitingDecrypt)
            }
            (Direction::Encrypt, PathChange::Deleted { entry })
            | (Direction::Encrypt, PathChange::Tombstoned { entry }) => {
                actions.push(Action::DeleteBlob { entry })
            }

            (Direction::Decrypt, PathChange::Deleted { entry }) => {
                actions.push(Action::Decrypt { entry })
            }
            (Direction::Decrypt, PathChange::Modified { entry, .. }) => {
                tracing::warn!(path = %entry.path, "Local edits will be overwritten by decrypt");
                actions.push(Action::Decrypt { entry })
            }
            (Direction::Decrypt, PathChange::New { path, .. }) => {
                skip(&path, SkipReason::Untracked)
            }
            (Direction::Decrypt, PathChange::BlobMissing { entry, .. }) => {
                tracing::warn!(path = %entry.path, "Blob missing, nothing to decrypt");
                skip(&entry.path, SkipReason::BlobMissing)
            }
            (Direction::Decrypt, PathChange::Tombstoned { entry })
            | (Direction::Decrypt, PathChange::Revived { entry, .. }) => {
                skip(&entry.path, SkipReason::Tombstoned)
            }
        }
    }

    actions.sort_by(|a, b| (a.rank(), a.path()).cmp(&(b.rank(), b.path())));

    SyncPlan {
        direction,
        actions,
        refreshes,
        skipped,
        failures: Vec::new(),
    }
}
