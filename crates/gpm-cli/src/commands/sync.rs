//! Encrypt and decrypt command implementations

use colored::Colorize;

use gpm_core::{CancelToken, Direction, SyncOptions, SyncReport};

use crate::context::Context;
use crate::error::{CliError, Result};

/// Run an encrypt or decrypt pass over the tree.
///
/// Exits through [`CliError::PathsFailed`] when any path failed, after
/// printing what did succeed.
pub fn run_sync(context: &Context, direction: Direction, dry_run: bool, cancel: CancelToken) -> Result<()> {
    let verb = match direction {
        Direction::Encrypt => "Encrypting",
        Direction::Decrypt => "Decrypting",
    };
    println!("{} {} {}...", "=>".blue().bold(), verb, context.root.display());

    let recipient = context.recipient(direction == Direction::Encrypt)?;
    let engine = context.engine(recipient, cancel)?;
    let report = engine.sync_with_options(
        direction,
        SyncOptions {
            dry_run,
            ..Default::default()
        },
    )?;

    print_report(&report);

    if report.cancelled {
        return Err(CliError::Interrupted {
            pending: report.pending,
        });
    }
    if report.summary.failed > 0 {
        return Err(CliError::PathsFailed {
            failed: report.summary.failed,
        });
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.actions.is_empty() && report.failures.is_empty() {
        println!("{} Already in sync. No changes needed.", "OK".green().bold());
    } else {
        for action in &report.actions {
            println!("   {} {}", "+".green(), action);
        }
        for failure in &report.failures {
            println!("   {} {}", "!".red(), failure);
        }
    }

    if let Some(gc) = &report.gc
        && !gc.removed.is_empty()
    {
        println!("   {} removed {} orphan blob(s)", "-".yellow(), gc.removed.len());
    }

    let summary = &report.summary;
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().bold()
    } else {
        summary.failed.to_string().normal()
    };
    println!(
        "{}: {} processed, {} skipped, {} failed{}",
        "Summary".bold(),
        summary.processed,
        summary.skipped,
        failed,
        if report.reused > 0 {
            format!(" ({} reused)", report.reused)
        } else {
            String::new()
        }
    );
}
