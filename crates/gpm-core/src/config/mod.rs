//! Configuration schema and layered resolution

mod resolver;

pub use resolver::{ConfigOverrides, ConfigResolver, merge_values};

use std::path::PathBuf;
use std::time::Duration;

use gpm_fs::RobustnessConfig;
use serde::{Deserialize, Serialize};

use crate::adapter::{ADAPTER_NAMES, NativeAdapter};
use crate::{Error, Result};

/// Upper bound for the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Effective configuration after all layers are merged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpmConfig {
    pub engine: EngineSettings,
    pub scan: ScanSettings,
    pub store: StoreSettings,
    pub gpg: GpgSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Adapter name, `native` or `gpg`
    pub adapter: String,
    /// Worker threads; unset means available parallelism capped at 8
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Save the manifest every N applied outcomes, 0 disables checkpoints
    pub checkpoint_every: usize,
    pub fsync: bool,
    pub lock_timeout_ms: u64,
    /// Delete unreferenced blobs at the end of each encrypt run
    pub prune_orphans: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            adapter: NativeAdapter::NAME.to_string(),
            workers: None,
            checkpoint_every: 64,
            fsync: true,
            lock_timeout_ms: 5000,
            prune_orphans: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSettings {
    /// Globs matched against relative paths and file names
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// Data directory, relative to the root or absolute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpgSettings {
    pub program: String,
    /// Recipient key ids; empty means symmetric encryption
    pub recipients: Vec<String>,
}

impl Default for GpgSettings {
    fn default() -> Self {
        Self {
            program: "gpg".to_string(),
            recipients: Vec::new(),
        }
    }
}

impl GpmConfig {
    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        if !ADAPTER_NAMES.contains(&self.engine.adapter.as_str()) {
            return Err(Error::config(format!(
                "Unknown adapter '{}' (expected one of: {})",
                self.engine.adapter,
                ADAPTER_NAMES.join(", ")
            )));
        }
        if self.engine.workers == Some(0) {
            return Err(Error::config("engine.workers must be at least 1"));
        }
        if self.store.output.as_deref().is_some_and(str::is_empty) {
            return Err(Error::config("store.output must not be empty"));
        }
        Ok(())
    }

    /// Worker count to use for a run.
    pub fn workers(&self) -> usize {
        self.engine.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(MAX_DEFAULT_WORKERS)
        })
    }

    pub fn robustness(&self) -> RobustnessConfig {
        RobustnessConfig {
            lock_timeout: Duration::from_millis(self.engine.lock_timeout_ms),
            enable_fsync: self.engine.fsync,
        }
    }

    pub fn output(&self) -> Option<PathBuf> {
        self.store.output.as_ref().map(PathBuf::from)
    }
}
