//! Locations of state and data inside a managed working tree

use std::path::{Path, PathBuf};

use gpm_fs::GpmPath;

/// Resolved directory layout of one working tree.
///
/// ```text
/// <root>/.gpm/                 state directory
/// <root>/.gpm/manifest.toml    local manifest
/// <root>/.gpm/lock             run lock
/// <data>/                      defaults to <root>/.gpm/data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    root: PathBuf,
    state_dir: PathBuf,
    data_dir: PathBuf,
}

impl RepoLayout {
    /// Build the layout for `root`. A relative `output` is resolved against
    /// the root; `None` selects the default data directory.
    pub fn new(root: impl Into<PathBuf>, output: Option<&Path>) -> Self {
        let root = root.into();
        let state_dir = root.join(GpmPath::StateDir.as_str());
        let data_dir = match output {
            Some(out) if out.is_absolute() => out.to_path_buf(),
            Some(out) => root.join(out),
            None => state_dir.join(GpmPath::DataDir.as_str()),
        };
        Self {
            root,
            state_dir,
            data_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join(GpmPath::Manifest.as_str())
    }

    pub fn run_lock_path(&self) -> PathBuf {
        self.state_dir.join(GpmPath::RunLock.as_str())
    }

    pub fn config_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }
}
