//! Bounded worker pool for encrypt and decrypt actions
//!
//! Workers pull actions from a shared queue and send outcomes back over a
//! channel. Only the coordinating thread touches the manifest.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;

use gpm_fs::NormalizedPath;
use gpm_fs::checksum::compute_content_checksum;

use crate::adapter::{EncryptionAdapter, RecipientConfig};
use crate::blob::{BlobId, BlobStore};
use crate::error::PathError;
use crate::fingerprint::{StatInfo, fingerprint_bytes};
use crate::manifest::{EntryMode, ManifestEntry};

/// Shared flag asking a running sync to stop taking new actions
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one executed action
#[derive(Debug)]
pub(crate) enum Outcome {
    Encrypted {
        entry: ManifestEntry,
        previous: Option<ManifestEntry>,
        reused: bool,
    },
    Decrypted {
        entry: ManifestEntry,
    },
    Failed {
        path: NormalizedPath,
        error: PathError,
    },
}

/// An encrypt or decrypt action, run on the pool
#[derive(Debug, Clone)]
pub(crate) enum Job {
    Encrypt {
        path: NormalizedPath,
        previous: Option<ManifestEntry>,
    },
    Decrypt {
        entry: ManifestEntry,
    },
}

impl Job {
    pub fn path(&self) -> &NormalizedPath {
        match self {
            Self::Encrypt { path, .. } => path,
            Self::Decrypt { entry } => &entry.path,
        }
    }
}

/// Everything a worker needs to run a job
pub(crate) struct Worker<'a> {
    pub root: &'a Path,
    pub store: &'a BlobStore,
    pub adapter: &'a dyn EncryptionAdapter,
    pub recipient: &'a RecipientConfig,
    pub blob_salt: &'a str,
    pub fsync: bool,
}

impl Worker<'_> {
    pub fn execute(&self, job: Job) -> Outcome {
        let path = job.path().clone();
        let result = match job {
            Job::Encrypt { path, previous } => self.encrypt(path, previous),
            Job::Decrypt { entry } => self.decrypt(entry),
        };
        result.unwrap_or_else(|error| Outcome::Failed { path, error })
    }

    fn encrypt(&self, path: NormalizedPath, previous: Option<ManifestEntry>) -> Result<Outcome, PathError> {
        let native = self.root.join(path.to_native());
        let scan_err = |e: std::io::Error| PathError::Scan(e.to_string());

        let before = StatInfo::of(&native).map_err(scan_err)?;
        let content = fs::read(&native).map_err(scan_err)?;
        let after = StatInfo::of(&native).map_err(scan_err)?;
        if before != after {
            return Err(PathError::Scan("file changed while it was being read".into()));
        }

        let fingerprint = fingerprint_bytes(&content, after);
        let blob_id = BlobId::derive(self.blob_salt, &fingerprint.content_hash);
        let reused = self.store.contains(&blob_id);
        if !reused {
            let ciphertext = self.adapter.encrypt(&content, self.recipient)?;
            self.store.put(&blob_id, &ciphertext)?;
        }

        Ok(Outcome::Encrypted {
            entry: ManifestEntry {
                path,
                content_hash: fingerprint.content_hash,
                size: fingerprint.stat.size,
                modified_time: fingerprint.stat.modified,
                blob_id,
                mode: EntryMode::Synced,
            },
            previous,
            reused,
        })
    }

    fn decrypt(&self, entry: ManifestEntry) -> Result<Outcome, PathError> {
        let ciphertext = self.store.get(&entry.blob_id)?;
        let plaintext = self.adapter.decrypt(&ciphertext, self.recipient)?;

        let actual = compute_content_checksum(&plaintext);
        if actual != entry.content_hash {
            return Err(PathError::Integrity {
                expected: entry.content_hash,
                actual,
            });
        }

        let target = self.root.join(entry.path.to_native());
        gpm_fs::io::ensure_no_symlinks(self.root, &target)?;
        gpm_fs::io::replace_atomic(&target, &plaintext, self.fsync)?;
        let stat = StatInfo::of(&target).map_err(|e| PathError::Write(e.to_string()))?;

        Ok(Outcome::Decrypted {
            entry: entry.refreshed(stat),
        })
    }
}

/// Run `jobs` on up to `workers` threads, handing each outcome to
/// `on_outcome` on the calling thread as it arrives.
///
/// Returns the jobs that were never started because `cancel` was set.
pub(crate) fn run_pool<F>(
    worker: &Worker<'_>,
    jobs: Vec<Job>,
    workers: usize,
    cancel: &CancelToken,
    mut on_outcome: F,
) -> Vec<Job>
where
    F: FnMut(Outcome),
{
    if jobs.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, jobs.len());
    let queue = Mutex::new(VecDeque::from(jobs));

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(job) = next else { break };
                    if tx.send(worker.execute(job)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        for outcome in rx {
            on_outcome(outcome);
        }
    });

    queue
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into()
}
