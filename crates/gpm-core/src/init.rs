//! Initialization of a managed working tree

use std::fs;
use std::path::{Path, PathBuf};

use gpm_fs::{GpmPath, NormalizedPath, RobustnessConfig, find_config, io, save_config};

use crate::config::GpmConfig;
use crate::layout::RepoLayout;
use crate::Result;

/// Keeps local state out of version control while `data/` stays publishable.
const GITIGNORE_CONTENT: &str = "\
# Managed by gpm: local state only, never publish
manifest.toml
config.*
lock
*.lock
";

/// What `initialize` created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub created: Vec<PathBuf>,
    pub already_initialized: bool,
}

/// Create `.gpm/`, a default config naming `adapter`, and `.gpm/.gitignore`.
///
/// Existing files are left alone, so running it twice is harmless.
pub fn initialize(root: &Path, adapter: &str) -> Result<InitReport> {
    let mut config = GpmConfig::default();
    config.engine.adapter = adapter.to_string();
    config.validate()?;

    if !root.is_dir() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory");
        return Err(gpm_fs::Error::io(root, source).into());
    }

    let layout = RepoLayout::new(root, None);
    let mut report = InitReport {
        already_initialized: layout.is_initialized(),
        ..Default::default()
    };

    let state_dir = layout.state_dir();
    if !state_dir.is_dir() {
        fs::create_dir_all(state_dir).map_err(|e| gpm_fs::Error::io(state_dir, e))?;
        report.created.push(state_dir.to_path_buf());
    }

    let state = NormalizedPath::new(state_dir);
    if find_config(&state, "config").is_none() {
        let path = state.join(GpmPath::Config.as_str());
        save_config(&path, &config, RobustnessConfig::default())?;
        report.created.push(path.to_native());
    }

    let gitignore = state.join(GpmPath::GitIgnore.as_str());
    if !gitignore.exists() {
        io::write_text(&gitignore, GITIGNORE_CONTENT)?;
        report.created.push(gitignore.to_native());
    }

    tracing::info!(root = %root.display(), adapter, "Initialized working tree");
    Ok(report)
}
