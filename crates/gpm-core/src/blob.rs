//! Content-addressed store of encrypted blobs
//!
//! Layout under the data directory:
//!
//! ```text
//! <data>/objects/<2 hex>/<62 hex>   one file per blob id
//! <data>/manifest.enc               encrypted manifest snapshot
//! ```
//!
//! Every write goes through a temp file and an atomic rename, so a blob is
//! either absent or complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gpm_fs::GpmPath;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Domain separator for blob id derivation
const BLOB_ID_DOMAIN: &[u8] = b"gpm-blob-v1";

/// Identifier of an encrypted blob: 64 lowercase hex characters.
///
/// Derived from the plaintext content hash and the repository salt, never
/// from the path or modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Derive the blob id for `content_hash` under `salt`.
    pub fn derive(salt: &str, content_hash: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(BLOB_ID_DOMAIN);
        hasher.update([0u8]);
        hasher.update(salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(content_hash.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parse an id, rejecting anything that is not 64 lowercase hex digits.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shard directory name (first byte).
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// The file name inside the shard directory.
    pub fn suffix(&self) -> &str {
        &self.0[2..]
    }
}

impl TryFrom<String> for BlobId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid blob id '{value}'"))
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from blob store operations
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob {id} not found")]
    NotFound { id: BlobId },

    #[error("blob store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BlobStoreError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<gpm_fs::Error> for BlobStoreError {
    fn from(err: gpm_fs::Error) -> Self {
        match err {
            gpm_fs::Error::Io { path, source } => Self::Io { path, source },
            other => Self::Io {
                path: PathBuf::new(),
                source: io::Error::other(other.to_string()),
            },
        }
    }
}

/// Store of encrypted blobs rooted at a data directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    data_dir: PathBuf,
    fsync: bool,
}

impl BlobStore {
    /// Open a store rooted at `data_dir`. Directories are created lazily.
    pub fn open(data_dir: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            fsync,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join(GpmPath::ObjectsDir.as_str())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(GpmPath::ManifestSnapshot.as_str())
    }

    /// Location of a blob, a pure function of its id.
    pub fn blob_path(&self, id: &BlobId) -> PathBuf {
        self.objects_dir().join(id.prefix()).join(id.suffix())
    }

    pub fn contains(&self, id: &BlobId) -> bool {
        self.blob_path(id).is_file()
    }

    /// Atomically create or replace a blob.
    pub fn put(&self, id: &BlobId, ciphertext: &[u8]) -> Result<(), BlobStoreError> {
        let path = self.blob_path(id);
        gpm_fs::io::replace_atomic(&path, ciphertext, self.fsync)?;
        tracing::debug!(blob = %id, bytes = ciphertext.len(), "Stored blob");
        Ok(())
    }

    pub fn get(&self, id: &BlobId) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.blob_path(id);
        fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BlobStoreError::NotFound { id: id.clone() }
            } else {
                BlobStoreError::io(&path, e)
            }
        })
    }

    /// Delete a blob, failing with `NotFound` if it is absent.
    pub fn delete(&self, id: &BlobId) -> Result<(), BlobStoreError> {
        if self.delete_if_present(id)? {
            Ok(())
        } else {
            Err(BlobStoreError::NotFound { id: id.clone() })
        }
    }

    /// Delete a blob if it exists. Returns whether anything was removed.
    pub fn delete_if_present(&self, id: &BlobId) -> Result<bool, BlobStoreError> {
        let path = self.blob_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(shard) = path.parent() {
                    // Fails harmlessly while the shard still holds other blobs.
                    let _ = fs::remove_dir(shard);
                }
                tracing::debug!(blob = %id, "Deleted blob");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobStoreError::io(&path, e)),
        }
    }

    /// All blob ids currently in the store, sorted.
    ///
    /// Temp files left behind by an interrupted write are not blobs and are
    /// skipped.
    pub fn list(&self) -> Result<Vec<BlobId>, BlobStoreError> {
        let objects = self.objects_dir();
        let shards = match fs::read_dir(&objects) {
            Ok(shards) => shards,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BlobStoreError::io(&objects, e)),
        };

        let mut ids = Vec::new();
        for shard in shards {
            let shard = shard.map_err(|e| BlobStoreError::io(&objects, e))?;
            let shard_name = shard.file_name().to_string_lossy().to_string();
            if shard_name.len() != 2 || !shard.path().is_dir() {
                continue;
            }
            let files = fs::read_dir(shard.path()).map_err(|e| BlobStoreError::io(shard.path(), e))?;
            for file in files.flatten() {
                let name = file.file_name().to_string_lossy().to_string();
                if let Some(id) = BlobId::parse(&format!("{shard_name}{name}")) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn write_snapshot(&self, ciphertext: &[u8]) -> Result<(), BlobStoreError> {
        gpm_fs::io::replace_atomic(&self.snapshot_path(), ciphertext, self.fsync)?;
        Ok(())
    }

    /// Read the encrypted manifest snapshot, if one has been published.
    pub fn read_snapshot(&self) -> Result<Option<Vec<u8>>, BlobStoreError> {
        let path = self.snapshot_path();
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobStoreError::io(&path, e)),
        }
    }
}
