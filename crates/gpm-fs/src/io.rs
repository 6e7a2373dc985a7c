//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Tuning knobs for locked, durable writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// How long to keep retrying a held advisory lock before giving up
    pub lock_timeout: Duration,
    /// Whether to fsync the temp file before the rename
    pub enable_fsync: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            enable_fsync: true,
        }
    }
}

/// Acquire an exclusive advisory lock on `lock_path`, creating the file
/// if needed.
///
/// Retries with exponential backoff until `timeout` elapses. The lock is
/// released when the returned handle is dropped.
pub fn acquire_lock(lock_path: &Path, timeout: Duration) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| Error::io(lock_path, e))?;

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(10))
        .with_max_interval(Duration::from_millis(250))
        .with_max_elapsed_time(Some(timeout))
        .build();

    let mut attempts = 0u32;
    backoff::retry(policy, || {
        attempts += 1;
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            tracing::trace!(path = %lock_path.display(), attempts, "Lock busy, retrying");
            backoff::Error::transient(e)
        })
    })
    .map_err(|_| {
        tracing::warn!(
            path = %lock_path.display(),
            attempts,
            timeout_ms = timeout.as_millis() as u64,
            "Gave up waiting for lock"
        );
        Error::LockFailed {
            path: lock_path.to_path_buf(),
        }
    })?;

    if attempts > 1 {
        tracing::debug!(path = %lock_path.display(), attempts, "Acquired lock after contention");
    }
    Ok(file)
}

/// Try once to take an exclusive advisory lock, without waiting.
///
/// Returns `Ok(None)` when another holder owns the lock.
pub fn try_lock(lock_path: &Path) -> Result<Option<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| Error::io(lock_path, e))?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => Ok(Some(file)),
        Err(e) => {
            tracing::debug!(path = %lock_path.display(), error = %e, "Lock held elsewhere");
            Ok(None)
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename strategy to prevent partial writes.
/// An advisory lock on `<path>.lock` serializes concurrent writers.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let lock_path = PathBuf::from(format!("{}.lock", native_path.display()));
    let lock = acquire_lock(&lock_path, config.lock_timeout)?;

    let result = replace_atomic(&native_path, content, config.enable_fsync);

    FileExt::unlock(&lock).map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    result
}

/// Atomically create or replace `path` without taking a lock.
///
/// The content is written to a uniquely named temp file in the same
/// directory and renamed over the target. Readers observe either the old
/// file or the complete new one, never a partial write.
pub fn replace_atomic(path: &Path, content: &[u8], fsync: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    );
    let temp_path = parent.join(temp_name);

    let write_result = (|| -> Result<()> {
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| Error::io(&temp_path, e))?;
        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;
        if fsync {
            temp_file
                .sync_all()
                .map_err(|e| Error::io(&temp_path, e))?;
        }
        Ok(())
    })();

    if let Err(e) = write_result {
        tracing::warn!(path = %path.display(), error = %e, "Atomic write failed, discarding temp file");
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Rename over target failed, discarding temp file");
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })
}

/// Reject a write target under `root` if any existing component between
/// `root` and the target (inclusive) is a symbolic link.
pub fn ensure_no_symlinks(root: &Path, target: &Path) -> Result<()> {
    let rel = target
        .strip_prefix(root)
        .map_err(|_| Error::PathEscapesRoot {
            path: target.display().to_string(),
        })?;

    let mut current = root.to_path_buf();
    for component in rel.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::SymlinkInPath { path: current });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(Error::io(&current, e)),
        }
    }
    Ok(())
}

/// Read the full content of a file.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Write text content to a file atomically with default robustness settings.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}
