//! Manifest entry definitions

use chrono::{DateTime, Utc};
use gpm_fs::NormalizedPath;
use gpm_fs::path::validate_relative_path;
use serde::{Deserialize, Deserializer, Serialize};

use crate::blob::BlobId;
use crate::fingerprint::StatInfo;

/// Direction state of a tracked path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryMode {
    /// Plaintext and blob agree with the recorded content hash
    #[default]
    Synced,
    /// An encrypt action was interrupted before it started
    EncryptPending,
    /// A decrypt action was interrupted before it started
    DecryptPending,
    /// The plaintext was deleted; the blob release is pending
    Tombstoned,
}

impl EntryMode {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::EncryptPending | Self::DecryptPending)
    }

    /// Whether the entry still holds a reference on its blob.
    pub fn is_live(self) -> bool {
        self != Self::Tombstoned
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Synced => "synced",
            Self::EncryptPending => "encrypt-pending",
            Self::DecryptPending => "decrypt-pending",
            Self::Tombstoned => "tombstoned",
        };
        f.write_str(label)
    }
}

/// Last synced state of one tracked path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the working tree root
    #[serde(deserialize_with = "deserialize_relative_path")]
    pub path: NormalizedPath,
    /// Digest of the plaintext at last sync (`sha256:<hex>`)
    pub content_hash: String,
    pub size: u64,
    pub modified_time: DateTime<Utc>,
    pub blob_id: BlobId,
    #[serde(default)]
    pub mode: EntryMode,
}

impl ManifestEntry {
    /// Hints recorded for this entry.
    pub fn stat(&self) -> StatInfo {
        StatInfo {
            size: self.size,
            modified: self.modified_time,
        }
    }

    /// Copy of this entry with fresh hints and `synced` mode.
    pub fn refreshed(&self, stat: StatInfo) -> Self {
        Self {
            size: stat.size,
            modified_time: stat.modified,
            mode: EntryMode::Synced,
            ..self.clone()
        }
    }
}

fn deserialize_relative_path<'de, D>(deserializer: D) -> Result<NormalizedPath, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    validate_relative_path(&raw).map_err(serde::de::Error::custom)
}
