//! [`TestTree`] builder for sync engine scenarios.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use gpm_core::{BlobId, BlobStore, EncryptionAdapter, GpmConfig, RecipientConfig, SyncEngine};
use tempfile::TempDir;

/// Passphrase every [`TestTree`] engine uses unless told otherwise.
pub const TEST_PASSPHRASE: &str = "correct horse battery staple";

/// A temporary working tree with an initialized `.gpm` directory.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use gpm_core::Direction;
/// use gpm_test_utils::{TestTree, XorAdapter};
///
/// let tree = TestTree::new();
/// tree.write("notes/a.txt", "secret");
/// let report = tree.engine(Arc::new(XorAdapter::new())).sync(Direction::Encrypt).unwrap();
/// assert!(report.success());
/// ```
pub struct TestTree {
    temp_dir: TempDir,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    /// Create a temporary directory containing `.gpm/`.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(".gpm")).unwrap();
        Self { temp_dir }
    }

    /// Create a temporary directory without `.gpm/`.
    pub fn uninitialized() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel))
            .unwrap_or_else(|e| panic!("Could not read {}: {}", rel, e))
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).unwrap();
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    /// Move the modification time of `rel` forward without changing content.
    pub fn touch(&self, rel: &str) {
        let path = self.path(rel);
        let current = fs::metadata(&path).unwrap().modified().unwrap();
        let later = current.max(SystemTime::now()) + Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    /// Default configuration for tests: two workers, no fsync.
    pub fn config(&self) -> GpmConfig {
        let mut config = GpmConfig::default();
        config.engine.workers = Some(2);
        config.engine.fsync = false;
        config.engine.lock_timeout_ms = 500;
        config
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path(".gpm/data")
    }

    pub fn blob_store(&self) -> BlobStore {
        BlobStore::open(self.data_dir(), false)
    }

    pub fn blob_ids(&self) -> Vec<BlobId> {
        self.blob_store().list().unwrap()
    }

    pub fn blob_count(&self) -> usize {
        self.blob_ids().len()
    }

    pub fn snapshot_exists(&self) -> bool {
        self.data_dir().join("manifest.enc").is_file()
    }

    pub fn manifest_text(&self) -> String {
        self.read(".gpm/manifest.toml")
    }

    /// Engine over this tree with [`TestTree::config`] and [`TEST_PASSPHRASE`].
    pub fn engine(&self, adapter: Arc<dyn EncryptionAdapter>) -> SyncEngine {
        self.engine_with(adapter, self.config())
    }

    pub fn engine_with(&self, adapter: Arc<dyn EncryptionAdapter>, config: GpmConfig) -> SyncEngine {
        SyncEngine::new(
            self.root(),
            config,
            adapter,
            RecipientConfig::passphrase(TEST_PASSPHRASE),
        )
        .unwrap()
    }

    /// Copy only the publishable data directory into a fresh tree, the way
    /// a clone of the published repository would see it.
    pub fn clone_published(&self) -> TestTree {
        let clone = TestTree::new();
        copy_dir(&self.data_dir(), &clone.data_dir());
        clone
    }

    /// Replace the published data directory with the one from `other`.
    pub fn pull_published_from(&self, other: &TestTree) {
        let data = self.data_dir();
        if data.exists() {
            fs::remove_dir_all(&data).unwrap();
        }
        copy_dir(&other.data_dir(), &data);
    }

    /// Assert that `rel` exists with exactly `content`.
    ///
    /// # Panics
    /// Panics with a descriptive message otherwise.
    pub fn assert_content(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        assert!(path.is_file(), "Expected file to exist: {}", path.display());
        let actual = self.read(rel);
        assert_eq!(actual, content, "Unexpected content in {}", rel);
    }
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}
