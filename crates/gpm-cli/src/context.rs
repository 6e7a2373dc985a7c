//! Working tree context detection
//!
//! Finds the managed root from any directory below it, resolves the
//! configuration and builds the engine for a command.

use std::path::{Path, PathBuf};

use dialoguer::Password;
use gpm_core::{
    CancelToken, ConfigOverrides, ConfigResolver, GpmConfig, RecipientConfig, RepoLayout, SyncEngine,
    build_adapter,
};
use gpm_fs::{GpmPath, NormalizedPath};

use crate::error::{CliError, Result};

/// Walk up from `start` to the nearest directory containing `.gpm/`.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(GpmPath::StateDir.as_str()).is_dir())
        .map(Path::to_path_buf)
}

/// Everything a command needs to know about the working tree
pub struct Context {
    pub root: PathBuf,
    pub config: GpmConfig,
    passphrase: Option<String>,
}

impl Context {
    /// Locate the tree and resolve its configuration.
    ///
    /// An explicit `directory` must itself be initialized; otherwise the
    /// current directory and its ancestors are searched.
    pub fn load(
        directory: Option<&Path>,
        output: Option<&Path>,
        jobs: Option<usize>,
        passphrase: Option<String>,
    ) -> Result<Self> {
        let root = match directory {
            Some(dir) => dir.to_path_buf(),
            None => {
                let cwd = std::env::current_dir()?;
                find_root(&cwd).ok_or_else(|| {
                    CliError::user(format!(
                        "No .gpm directory found in {} or any parent (run 'gpm init')",
                        cwd.display()
                    ))
                })?
            }
        };

        let overrides = ConfigOverrides {
            output: output.map(|p| p.to_string_lossy().into_owned()),
            workers: jobs,
            adapter: None,
        };
        let config = ConfigResolver::new(NormalizedPath::new(&root)).resolve_with(&overrides)?;
        tracing::debug!(root = %root.display(), adapter = %config.engine.adapter, "Resolved configuration");

        Ok(Self {
            root,
            config,
            passphrase,
        })
    }

    pub fn layout(&self) -> RepoLayout {
        RepoLayout::new(&self.root, self.config.output().as_deref())
    }

    fn uses_recipients(&self) -> bool {
        self.config.engine.adapter == "gpg" && !self.config.gpg.recipients.is_empty()
    }

    /// Whether the run would encrypt for the first time, so a typo in the
    /// passphrase would lock the data away.
    fn is_first_encrypt(&self) -> bool {
        let layout = self.layout();
        !layout.manifest_path().is_file() && !layout.data_dir().join(GpmPath::ManifestSnapshot.as_str()).is_file()
    }

    /// Whether planning must decrypt the published snapshot.
    pub fn needs_snapshot(&self) -> bool {
        let layout = self.layout();
        !layout.manifest_path().is_file() && layout.data_dir().join(GpmPath::ManifestSnapshot.as_str()).is_file()
    }

    /// Recipients from config, or the passphrase from the command line, the
    /// environment, or an interactive prompt.
    pub fn recipient(&self, encrypting: bool) -> Result<RecipientConfig> {
        if self.uses_recipients() {
            return Ok(RecipientConfig::Recipients(self.config.gpg.recipients.clone()));
        }
        if let Some(pass) = &self.passphrase {
            return Ok(RecipientConfig::passphrase(pass.clone()));
        }

        let prompt = Password::new().with_prompt("Passphrase");
        let pass = if encrypting && self.is_first_encrypt() {
            prompt
                .with_confirmation("Confirm passphrase", "Passphrases do not match")
                .interact()?
        } else {
            prompt.interact()?
        };
        Ok(RecipientConfig::passphrase(pass))
    }

    /// Recipient for read-only planning: only prompts when the snapshot
    /// has to be opened.
    pub fn planning_recipient(&self) -> Result<RecipientConfig> {
        if self.needs_snapshot() || self.passphrase.is_some() || self.uses_recipients() {
            self.recipient(false)
        } else {
            Ok(RecipientConfig::passphrase(String::new()))
        }
    }

    pub fn engine(&self, recipient: RecipientConfig, cancel: CancelToken) -> Result<SyncEngine> {
        let adapter = build_adapter(&self.config)?;
        let engine = SyncEngine::new(&self.root, self.config.clone(), adapter, recipient)?;
        Ok(engine.with_cancel_token(cancel))
    }
}
