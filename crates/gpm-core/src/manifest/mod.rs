//! Manifest of the last synced state
//!
//! The manifest is loaded once at the start of a run, owned by the engine
//! for its duration, and saved at checkpoints and at the end. It is
//! persisted as TOML with one `[[entry]]` table per tracked path.

mod entry;

pub use entry::{EntryMode, ManifestEntry};

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gpm_fs::{NormalizedPath, RobustnessConfig, checksum, io};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::blob::BlobId;
use crate::layout::RepoLayout;
use crate::{Error, Result};

/// Manifest format version written by this build
pub const MANIFEST_VERSION: &str = "1.0.0";

/// In-memory manifest keyed by relative path
#[derive(Debug, Clone)]
pub struct Manifest {
    version: Version,
    generation: u64,
    snapshot_generation: u64,
    blob_salt: String,
    updated_at: DateTime<Utc>,
    entries: BTreeMap<NormalizedPath, ManifestEntry>,
    dirty: bool,
    needs_write: bool,
}

#[derive(Serialize, Deserialize)]
struct ManifestFile {
    version: String,
    generation: u64,
    #[serde(default)]
    snapshot_generation: u64,
    blob_salt: String,
    updated_at: DateTime<Utc>,
    #[serde(default, rename = "entry")]
    entries: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Create an empty manifest with a fresh random blob salt.
    pub fn new() -> Self {
        let salt: [u8; 16] = rand::random();
        Self::with_salt(salt.iter().map(|b| format!("{b:02x}")).collect::<String>())
    }

    /// Create an empty manifest with a fixed blob salt.
    pub fn with_salt(blob_salt: impl Into<String>) -> Self {
        Self {
            version: Version::new(1, 0, 0),
            generation: 0,
            snapshot_generation: 0,
            blob_salt: blob_salt.into(),
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
            dirty: false,
            needs_write: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the encrypted snapshot this manifest last agreed with,
    /// either by writing it or by adopting it.
    pub fn snapshot_generation(&self) -> u64 {
        self.snapshot_generation
    }

    /// Whether changes were saved since the snapshot was last written.
    pub fn is_ahead_of_snapshot(&self) -> bool {
        self.generation != self.snapshot_generation
    }

    pub fn blob_salt(&self) -> &str {
        &self.blob_salt
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the manifest changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &NormalizedPath) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Insert or replace the entry for its path.
    pub fn insert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        let previous = self.entries.insert(entry.path.clone(), entry.clone());
        if previous.as_ref() != Some(&entry) {
            self.dirty = true;
        }
        previous
    }

    pub fn remove(&mut self, path: &NormalizedPath) -> Option<ManifestEntry> {
        let removed = self.entries.remove(path);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Change the mode of an entry, leaving its content fields untouched.
    pub fn set_mode(&mut self, path: &NormalizedPath, mode: EntryMode) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) if entry.mode != mode => {
                entry.mode = mode;
                self.dirty = true;
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Number of live (non-tombstoned) entries referencing `id`.
    pub fn live_refs(&self, id: &BlobId) -> usize {
        self.entries
            .values()
            .filter(|e| e.mode.is_live() && &e.blob_id == id)
            .count()
    }

    /// Every blob id referenced by any entry, tombstones included.
    pub fn referenced_blobs(&self) -> HashSet<BlobId> {
        self.entries.values().map(|e| e.blob_id.clone()).collect()
    }

    fn mark_saved(&mut self) {
        self.generation += 1;
        self.updated_at = Utc::now();
    }

    /// Take this manifest, read from a snapshot, as the local state.
    ///
    /// Live entries become `decrypt-pending`: this tree holds none of their
    /// plaintext yet, so an encrypt run must not read their absence as a
    /// deletion. The next save writes it without advancing the generation.
    pub(crate) fn adopt(&mut self) {
        for entry in self.entries.values_mut().filter(|e| e.mode.is_live()) {
            entry.mode = EntryMode::DecryptPending;
        }
        self.snapshot_generation = self.generation;
        self.needs_write = true;
    }

    /// Record that the snapshot now matches the current generation.
    pub(crate) fn mark_snapshot_written(&mut self) {
        if self.snapshot_generation != self.generation {
            self.snapshot_generation = self.generation;
            self.needs_write = true;
        }
    }

    /// Serialize to the on-disk TOML form.
    pub fn to_toml_string(&self) -> Result<String> {
        let file = ManifestFile {
            version: self.version.to_string(),
            generation: self.generation,
            snapshot_generation: self.snapshot_generation,
            blob_salt: self.blob_salt.clone(),
            updated_at: self.updated_at,
            entries: self.entries.values().cloned().collect(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    /// Parse and validate the TOML form. `origin` names the source in errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let corrupt = |reason: String| Error::ManifestCorrupt {
            path: origin.to_path_buf(),
            reason,
        };

        let header: VersionHeader =
            toml::from_str(content).map_err(|e| corrupt(e.message().to_string()))?;
        let version = Version::parse(&header.version)
            .map_err(|e| corrupt(format!("invalid version '{}': {}", header.version, e)))?;
        if version.major != 1 {
            return Err(Error::ManifestVersion {
                path: origin.to_path_buf(),
                found: version.to_string(),
                supported: MANIFEST_VERSION.to_string(),
            });
        }

        let file: ManifestFile =
            toml::from_str(content).map_err(|e| corrupt(e.message().to_string()))?;
        if file.blob_salt.is_empty() {
            return Err(corrupt("empty blob_salt".into()));
        }

        let mut entries = BTreeMap::new();
        for entry in file.entries {
            if !checksum::is_valid_checksum(&entry.content_hash) {
                return Err(corrupt(format!(
                    "malformed content hash for '{}'",
                    entry.path
                )));
            }
            let path = entry.path.clone();
            if entries.insert(path.clone(), entry).is_some() {
                return Err(corrupt(format!("duplicate path '{}'", path)));
            }
        }

        Ok(Self {
            version,
            generation: file.generation,
            snapshot_generation: file.snapshot_generation,
            blob_salt: file.blob_salt,
            updated_at: file.updated_at,
            entries,
            dirty: false,
            needs_write: false,
        })
    }
}

/// Exclusive lock held for the duration of a run.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Loads and saves the local manifest of a working tree
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    lock_path: PathBuf,
    robustness: RobustnessConfig,
}

impl ManifestStore {
    pub fn new(layout: &RepoLayout, robustness: RobustnessConfig) -> Self {
        Self {
            path: layout.manifest_path(),
            lock_path: layout.run_lock_path(),
            robustness,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the manifest, or an empty one on first run.
    ///
    /// # Errors
    ///
    /// A manifest that exists but cannot be parsed or validated is
    /// `ManifestCorrupt`; it is never treated as empty.
    pub fn load(&self) -> Result<Manifest> {
        match io::read_text(&NormalizedPath::new(&self.path)) {
            Ok(content) => Manifest::parse(&content, &self.path),
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %self.path.display(), "No manifest found, starting empty");
                Ok(Manifest::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the manifest atomically.
    ///
    /// The generation advances only when the content changed; an unchanged
    /// manifest is not rewritten if it already exists on disk.
    pub fn save(&self, manifest: &mut Manifest) -> Result<()> {
        if !manifest.dirty && !manifest.needs_write && self.exists() {
            return Ok(());
        }
        let mut next = manifest.clone();
        if manifest.is_dirty() {
            next.mark_saved();
        }
        let content = next.to_toml_string()?;
        io::write_atomic(&NormalizedPath::new(&self.path), content.as_bytes(), self.robustness)?;

        manifest.generation = next.generation;
        manifest.updated_at = next.updated_at;
        manifest.dirty = false;
        manifest.needs_write = false;
        tracing::debug!(
            path = %self.path.display(),
            generation = manifest.generation,
            entries = manifest.len(),
            "Saved manifest"
        );
        Ok(())
    }

    /// Take the run lock without waiting.
    ///
    /// # Errors
    ///
    /// `Locked` if another run holds it.
    pub fn lock(&self) -> Result<RunLock> {
        match io::try_lock(&self.lock_path)? {
            Some(file) => Ok(RunLock {
                _file: file,
                path: self.lock_path.clone(),
            }),
            None => Err(Error::Locked {
                path: self.lock_path.clone(),
            }),
        }
    }
}
