//! Init command implementation

use std::path::Path;

use colored::Colorize;

use crate::error::Result;

/// Run the init command
///
/// Creates `.gpm/` with a default config naming `adapter` and a
/// `.gitignore` for local state. Safe to run twice.
pub fn run_init(path: &Path, adapter: &str) -> Result<()> {
    println!(
        "{} Initializing {} with the {} adapter...",
        "=>".blue().bold(),
        path.display(),
        adapter.cyan()
    );

    let report = gpm_core::initialize(path, adapter)?;
    for created in &report.created {
        println!("   {} {}", "+".green(), created.display());
    }

    if report.already_initialized && report.created.is_empty() {
        println!("{} Already initialized. Nothing to do.", "OK".green().bold());
    } else {
        println!("{} Initialized!", "OK".green().bold());
        println!();
        println!("Run {} to encrypt the tree.", "gpm encrypt".cyan());
    }
    Ok(())
}
