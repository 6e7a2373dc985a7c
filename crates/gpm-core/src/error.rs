//! Error types for gpm-core

use std::path::PathBuf;

use gpm_fs::NormalizedPath;
use serde::Serialize;

use crate::adapter::AdapterError;
use crate::blob::BlobStoreError;

/// Result type for gpm-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest exists but cannot be trusted
    #[error("Manifest at {path} is corrupt: {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },

    /// The manifest was written by an incompatible version
    #[error("Manifest at {path} has version {found}, this build supports {supported}")]
    ManifestVersion {
        path: PathBuf,
        found: String,
        supported: String,
    },

    /// Another run holds the repository lock
    #[error("Another gpm run holds the lock at {path}")]
    Locked { path: PathBuf },

    /// The published snapshot is newer than the local manifest
    #[error(
        "Encrypted manifest snapshot is ahead of the local manifest \
         (snapshot generation {snapshot}, local generation {local}); run decrypt first"
    )]
    SnapshotAhead { local: u64, snapshot: u64 },

    /// The published snapshot cannot be decrypted or parsed
    #[error("Encrypted manifest snapshot at {path} could not be read: {reason}")]
    SnapshotUnreadable { path: PathBuf, reason: String },

    /// The configured encryption engine cannot be used
    #[error("Encryption adapter '{adapter}' is unavailable: {reason}")]
    AdapterUnavailable { adapter: String, reason: String },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No `.gpm` state directory under the working tree root
    #[error("{path} is not initialized (run `gpm init`)")]
    NotInitialized { path: PathBuf },

    /// Filesystem error from gpm-fs
    #[error(transparent)]
    Fs(#[from] gpm_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// A failure confined to a single path.
///
/// The action for that path is abandoned and its manifest entry is left as
/// it was; the rest of the run continues.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("unreadable: {0}")]
    Scan(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    BlobStore(#[from] BlobStoreError),

    #[error("write failed: {0}")]
    Write(String),

    #[error("decrypted content does not match manifest (expected {expected}, got {actual})")]
    Integrity { expected: String, actual: String },
}

impl PathError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Scan(_) => FailureKind::Scan,
            Self::Adapter(_) => FailureKind::Adapter,
            Self::BlobStore(_) => FailureKind::BlobStore,
            Self::Write(_) => FailureKind::Write,
            Self::Integrity { .. } => FailureKind::Integrity,
        }
    }
}

impl From<gpm_fs::Error> for PathError {
    fn from(err: gpm_fs::Error) -> Self {
        Self::Write(err.to_string())
    }
}

/// Category of a per-path failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Scan,
    Adapter,
    BlobStore,
    Write,
    Integrity,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Scan => "scan",
            Self::Adapter => "adapter",
            Self::BlobStore => "blob-store",
            Self::Write => "write",
            Self::Integrity => "integrity",
        };
        f.write_str(label)
    }
}

/// A per-path failure as recorded in a run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathFailure {
    pub path: NormalizedPath,
    pub kind: FailureKind,
    pub message: String,
}

impl PathFailure {
    pub fn new(path: NormalizedPath, error: &PathError) -> Self {
        Self {
            path,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for PathFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.kind, self.message)
    }
}
