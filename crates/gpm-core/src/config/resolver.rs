//! Configuration resolution with hierarchical merge
//!
//! Layers, later ones overriding earlier ones:
//! 1. Global (`<config_dir>/gpm/config.{toml,yaml,yml,json}`)
//! 2. Repository (`<root>/.gpm/config.{toml,yaml,yml,json}`)
//! 3. Command-line overrides
//!
//! Tables are merged key by key; any other value is replaced.

use std::path::PathBuf;

use gpm_fs::{GpmPath, NormalizedPath, find_config, load_config};
use serde_json::Value;

use super::GpmConfig;
use crate::{Error, Result};

/// Values supplied on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub output: Option<String>,
    pub workers: Option<usize>,
    pub adapter: Option<String>,
}

/// Resolves configuration by merging multiple sources
pub struct ConfigResolver {
    root: NormalizedPath,
    /// Override for the global config directory (used for testing).
    global_config_dir_override: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(root: NormalizedPath) -> Self {
        Self {
            root,
            global_config_dir_override: None,
        }
    }

    /// Create a resolver with a custom global config directory.
    pub fn with_global_config_dir(root: NormalizedPath, global_config_dir: PathBuf) -> Self {
        Self {
            root,
            global_config_dir_override: Some(global_config_dir),
        }
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join("gpm"))
    }

    fn repo_config_dir(&self) -> NormalizedPath {
        self.root.join(GpmPath::StateDir.as_str())
    }

    /// Path of the repository config file, if one exists.
    pub fn repo_config_path(&self) -> Option<NormalizedPath> {
        find_config(&self.repo_config_dir(), "config")
    }

    pub fn has_config(&self) -> bool {
        self.repo_config_path().is_some()
    }

    pub fn resolve(&self) -> Result<GpmConfig> {
        self.resolve_with(&ConfigOverrides::default())
    }

    /// Merge every layer and validate the result.
    ///
    /// Missing layers are skipped. An unparsable layer or an invalid merged
    /// value is a `Config` error.
    pub fn resolve_with(&self, overrides: &ConfigOverrides) -> Result<GpmConfig> {
        let mut merged = Value::Object(Default::default());

        if let Some(global_dir) = self.global_config_dir() {
            match find_config(&NormalizedPath::new(&global_dir), "config") {
                Some(path) => {
                    tracing::debug!(%path, "Loading global config (layer 1)");
                    merge_values(&mut merged, load_layer(&path)?);
                }
                None => tracing::debug!(dir = %global_dir.display(), "No global config found (layer 1)"),
            }
        }

        if let Some(path) = self.repo_config_path() {
            tracing::debug!(%path, "Loading repo config (layer 2)");
            merge_values(&mut merged, load_layer(&path)?);
        }

        let mut config: GpmConfig = serde_json::from_value(merged)
            .map_err(|e| Error::config(format!("Invalid configuration: {}", e)))?;

        if let Some(output) = &overrides.output {
            config.store.output = Some(output.clone());
        }
        if let Some(workers) = overrides.workers {
            config.engine.workers = Some(workers);
        }
        if let Some(adapter) = &overrides.adapter {
            config.engine.adapter = adapter.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_layer(path: &NormalizedPath) -> Result<Value> {
    let value: Value = load_config(path).map_err(|e| Error::config(e.to_string()))?;
    match value {
        Value::Object(_) => Ok(value),
        // An empty TOML/YAML file
        Value::Null => Ok(Value::Object(Default::default())),
        _ => Err(Error::config(format!("{} must contain a table", path))),
    }
}

/// Deep-merge `overlay` into `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
