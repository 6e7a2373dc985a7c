//! Content digests and cheap change hints
//!
//! The two-tier check keeps hashing off the hot path: [`may_have_changed`]
//! only compares stat data, and [`has_changed`] is consulted only when the
//! hints disagree.

use std::fs::Metadata;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use gpm_fs::checksum;
use serde::{Deserialize, Serialize};

use crate::manifest::ManifestEntry;

/// Size and modification time of a file, as observed without following links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatInfo {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl StatInfo {
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    /// Stat `path` with `symlink_metadata`.
    pub fn of(path: &Path) -> io::Result<Self> {
        Self::from_metadata(&std::fs::symlink_metadata(path)?)
    }
}

/// Authoritative digest of a file together with the hints seen while hashing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub content_hash: String,
    pub stat: StatInfo,
}

/// Cheap check: true when the hints differ from the entry, or when the entry
/// is pending and must be verified regardless.
pub fn may_have_changed(entry: &ManifestEntry, stat: &StatInfo) -> bool {
    entry.mode.is_pending() || entry.size != stat.size || entry.modified_time != stat.modified
}

/// Authoritative check against a freshly computed fingerprint.
pub fn has_changed(entry: &ManifestEntry, fingerprint: &Fingerprint) -> bool {
    entry.content_hash != fingerprint.content_hash
}

/// Hash a file by streaming its content.
///
/// The stat is taken before and after hashing; a file that changes while it
/// is being read is reported as an error instead of yielding a digest that
/// matches neither version.
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
    let before = StatInfo::of(path)?;
    let content_hash = checksum::compute_file_checksum(path)?;
    let after = StatInfo::of(path)?;
    if before != after {
        return Err(io::Error::other("file changed while it was being hashed"));
    }
    Ok(Fingerprint {
        content_hash,
        stat: after,
    })
}

/// Fingerprint content that is already in memory, pairing it with `stat`.
pub fn fingerprint_bytes(content: &[u8], stat: StatInfo) -> Fingerprint {
    Fingerprint {
        content_hash: checksum::compute_content_checksum(content),
        stat,
    }
}
