//! Gc command implementation

use colored::Colorize;
use gpm_core::CancelToken;

use crate::context::Context;
use crate::error::{CliError, Result};

/// Delete blobs no manifest entry references.
pub fn run_gc(context: &Context, dry_run: bool) -> Result<()> {
    println!("{} Looking for orphan blobs...", "=>".blue().bold());

    let recipient = context.recipient(false)?;
    let engine = context.engine(recipient, CancelToken::new())?;
    let report = engine.gc(dry_run)?;

    if report.removed.is_empty() && report.failed.is_empty() {
        println!("{} No orphan blobs.", "OK".green().bold());
        return Ok(());
    }

    let prefix = if dry_run { "[dry-run] Would delete" } else { "Deleted" };
    for id in &report.removed {
        println!("   {} {} {}", "-".yellow(), prefix, id);
    }
    for failure in &report.failed {
        println!("   {} {}", "!".red(), failure);
    }

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::PathsFailed {
            failed: report.failed.len(),
        })
    }
}
