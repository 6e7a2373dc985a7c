//! Filesystem abstraction for Git Privacy Manager
//!
//! Provides normalized path handling, content checksums and safe I/O
//! operations shared by the sync engine and the CLI.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use config::{ConfigFormat, find_config, load_config, save_config};
pub use constants::{GpmPath, VCS_METADATA_DIRS};
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use path::NormalizedPath;
