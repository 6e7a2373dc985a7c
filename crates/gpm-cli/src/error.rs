//! Error types for gpm-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit status when at least one path failed
pub const EXIT_PATHS_FAILED: i32 = 2;
/// Exit status after an interrupted run
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from gpm-core
    #[error(transparent)]
    Core(#[from] gpm_core::Error),

    /// Error from gpm-fs
    #[error(transparent)]
    Fs(#[from] gpm_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Interactive prompt error
    #[error("Interactive prompt error: {0}")]
    Dialoguer(#[from] dialoguer::Error),

    /// Some paths failed; the rest of the run is committed
    #[error("{failed} path(s) failed")]
    PathsFailed { failed: usize },

    /// The run stopped early on Ctrl-C
    #[error("Interrupted, {pending} action(s) left for the next run")]
    Interrupted { pending: usize },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PathsFailed { .. } => EXIT_PATHS_FAILED,
            Self::Interrupted { .. } => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}
