//! Run reports

use serde::Serialize;

use crate::blob::BlobId;
use crate::diff::Direction;
use crate::error::PathFailure;

/// Per-run counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Actions that completed
    pub processed: usize,
    /// Paths that needed no action
    pub skipped: usize,
    /// Paths whose action failed
    pub failed: usize,
}

/// Result of orphan reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub dry_run: bool,
    /// Orphans deleted, or that would be deleted in a dry run
    pub removed: Vec<BlobId>,
    /// Orphans that could not be deleted
    pub failed: Vec<String>,
}

/// Report from an encrypt or decrypt run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: Direction,
    pub dry_run: bool,
    /// Set when the run stopped early on request
    pub cancelled: bool,
    pub summary: RunSummary,
    /// Actions taken, or planned in a dry run
    pub actions: Vec<String>,
    pub failures: Vec<PathFailure>,
    /// Actions never started because the run was cancelled
    pub pending: usize,
    /// Blobs reused instead of re-encrypting identical content
    pub reused: usize,
    pub gc: Option<GcReport>,
}

impl SyncReport {
    pub fn new(direction: Direction, dry_run: bool) -> Self {
        Self {
            direction,
            dry_run,
            cancelled: false,
            summary: RunSummary::default(),
            actions: Vec::new(),
            failures: Vec::new(),
            pending: 0,
            reused: 0,
            gc: None,
        }
    }

    /// Whether every path was processed without error.
    pub fn success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub(crate) fn record(&mut self, action: String) {
        self.summary.processed += 1;
        self.actions.push(action);
    }

    pub(crate) fn fail(&mut self, failure: PathFailure) {
        tracing::warn!(path = %failure.path, kind = %failure.kind, error = %failure.message, "Path failed");
        self.failures.push(failure);
        self.summary.failed = self.failures.len();
    }
}
