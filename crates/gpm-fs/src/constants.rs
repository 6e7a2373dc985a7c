//! Constants and enums for repository filesystem paths.

use std::path::Path;

/// Version control metadata directories that are never scanned.
///
/// `.git` may also appear as a plain file (worktrees, submodules); the
/// scanner excludes it in either form.
pub const VCS_METADATA_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr", ".jj", "_darcs"];

/// Well-known names inside a managed working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpmPath {
    /// The `.gpm` state directory at the working tree root
    StateDir,
    /// The `data` directory holding publishable encrypted content
    DataDir,
    /// The `objects` directory inside the data directory
    ObjectsDir,
    /// The local manifest file inside the state directory
    Manifest,
    /// The encrypted manifest snapshot inside the data directory
    ManifestSnapshot,
    /// The repository configuration file inside the state directory
    Config,
    /// The run lock inside the state directory
    RunLock,
    /// The ignore file keeping local state out of version control
    GitIgnore,
}

impl GpmPath {
    /// Get the string representation of the path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateDir => ".gpm",
            Self::DataDir => "data",
            Self::ObjectsDir => "objects",
            Self::Manifest => "manifest.toml",
            Self::ManifestSnapshot => "manifest.enc",
            Self::Config => "config.toml",
            Self::RunLock => "lock",
            Self::GitIgnore => ".gitignore",
        }
    }
}

impl AsRef<Path> for GpmPath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for GpmPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for GpmPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
