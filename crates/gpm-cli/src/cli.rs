//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use gpm_core::Direction;

/// Git Privacy Manager - Keep an encrypted mirror of a working tree
#[derive(Parser, Debug)]
#[command(name = "gpm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Working tree root (defaults to the nearest directory holding .gpm/)
    #[arg(short, long, global = true)]
    pub directory: Option<PathBuf>,

    /// Directory for encrypted data (defaults to .gpm/data)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Passphrase for the native adapter or symmetric gpg
    #[arg(short, long, global = true, env = "GPM_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Initialize a working tree for encryption
    ///
    /// Creates .gpm/ with a default config.toml and a .gitignore that keeps
    /// local state out of version control.
    ///
    /// Examples:
    ///   gpm init                  # Native adapter
    ///   gpm init --adapter gpg    # Shell out to GnuPG
    Init {
        /// Encryption adapter
        #[arg(long, default_value = "native")]
        adapter: String,
    },

    /// Encrypt new and changed files into the data directory
    Encrypt {
        /// Preview changes without applying them
        #[arg(long)]
        dry_run: bool,

        /// Worker threads
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Decrypt blobs whose plaintext is missing or out of date
    Decrypt {
        /// Preview changes without applying them
        #[arg(long)]
        dry_run: bool,

        /// Worker threads
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Show what a run would do
    Status {
        /// Direction to plan for
        #[arg(long, value_enum, default_value_t = DirectionArg::Encrypt)]
        direction: DirectionArg,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Delete blobs no manifest entry references
    Gc {
        /// List orphans without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Encrypt,
    Decrypt,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Encrypt => Direction::Encrypt,
            DirectionArg::Decrypt => Direction::Decrypt,
        }
    }
}
