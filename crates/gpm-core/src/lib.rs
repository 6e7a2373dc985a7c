//! Incremental encryption sync engine for Git Privacy Manager
//!
//! Keeps a tree of plaintext files and a parallel store of encrypted blobs
//! in agreement, doing cryptographic work only for paths that changed since
//! the last run:
//!
//! - **Fingerprinter**: content digests plus cheap size/mtime hints
//! - **Manifest**: the persisted record of the last synced state
//! - **Tree scanner**: enumerates candidate files under the working tree
//! - **Diff engine and planner**: classify paths and order the actions
//! - **Blob store**: content-addressed ciphertext storage
//! - **SyncEngine**: runs a plan on a bounded worker pool
//!
//! # Architecture
//!
//! ```text
//!                    gpm-cli
//!                       |
//!                   gpm-core
//!        +--------+-----+------+---------+
//!        |        |            |         |
//!    scanner -> diff -> plan -> executor -+-> adapter
//!                 |                       |
//!              manifest               blob store
//!                       |
//!                    gpm-fs
//! ```

pub mod adapter;
pub mod blob;
pub mod config;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod init;
pub mod layout;
pub mod manifest;
pub mod plan;
pub mod scanner;
pub mod sync;

pub use adapter::{
    AdapterError, EncryptionAdapter, GpgAdapter, NativeAdapter, Passphrase, RecipientConfig,
    build_adapter,
};
pub use blob::{BlobId, BlobStore, BlobStoreError};
pub use config::{ConfigOverrides, ConfigResolver, GpmConfig};
pub use diff::{DiffEngine, DiffOutcome, Direction, Exclusion, PathChange};
pub use error::{Error, FailureKind, PathError, PathFailure, Result};
pub use fingerprint::{Fingerprint, StatInfo};
pub use init::{InitReport, initialize};
pub use layout::RepoLayout;
pub use manifest::{EntryMode, Manifest, ManifestEntry, ManifestStore, RunLock};
pub use plan::{Action, Refresh, SkipReason, Skipped, SyncPlan, plan};
pub use scanner::{ScanEntry, ScanPolicy, SpecialKind, TreeScanner};
pub use sync::{CancelToken, GcReport, RunSummary, SyncEngine, SyncOptions, SyncReport};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn error_manifest_corrupt_displays_path() {
        let error = Error::ManifestCorrupt {
            path: PathBuf::from("/tree/.gpm/manifest.toml"),
            reason: "duplicate path 'a.txt'".into(),
        };

        let display = format!("{}", error);
        assert!(
            display.contains("/tree/.gpm/manifest.toml"),
            "Error display should contain the path, got: {}",
            display
        );
        assert!(display.contains("duplicate path"), "got: {}", display);
    }

    #[test]
    fn error_wraps_fs_errors() {
        let fs_error = gpm_fs::Error::LockFailed {
            path: PathBuf::from("x.lock"),
        };
        let error: Error = fs_error.into();
        assert!(matches!(error, Error::Fs(_)));
    }
}
