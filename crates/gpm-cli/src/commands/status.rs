//! Status command implementation

use std::collections::BTreeMap;

use colored::Colorize;
use gpm_core::{CancelToken, Direction, SkipReason, SyncPlan};

use crate::context::Context;
use crate::error::Result;

/// Show the plan for `direction` without executing it.
pub fn run_status(context: &Context, direction: Direction, json: bool) -> Result<()> {
    let recipient = context.planning_recipient()?;
    let engine = context.engine(recipient, CancelToken::new())?;
    let plan = engine.plan(direction)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_plan(context, &plan);
    Ok(())
}

fn skip_label(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Unchanged => "unchanged".to_string(),
        SkipReason::Untracked => "untracked".to_string(),
        SkipReason::BlobMissing => "blob missing".to_string(),
        SkipReason::Tombstoned => "tombstoned".to_string(),
        SkipReason::AwaitingDecrypt => "not yet decrypted".to_string(),
        SkipReason::Ignored => "ignored".to_string(),
        SkipReason::Special(kind) => kind.to_string(),
    }
}

fn print_plan(context: &Context, plan: &SyncPlan) {
    println!("{}", "Tree Status".bold());
    println!();
    println!("{}:      {}", "Path".dimmed(), context.root.display());
    println!("{}:      {}", "Data".dimmed(), context.layout().data_dir().display());
    println!("{}: {}", "Direction".dimmed(), plan.direction.to_string().cyan());
    println!();

    println!("{}:", "Pending Actions".bold());
    if plan.actions.is_empty() {
        println!("  {} (nothing to do)", "None".dimmed());
    } else {
        for action in &plan.actions {
            println!("  {} {}", "+".green(), action);
        }
    }

    let mut skipped: BTreeMap<String, usize> = BTreeMap::new();
    for skip in &plan.skipped {
        *skipped.entry(skip_label(&skip.reason)).or_default() += 1;
    }
    if !skipped.is_empty() {
        println!();
        println!("{}:", "Skipped".bold());
        for (label, count) in &skipped {
            println!("  {} {}", count, label.dimmed());
        }
    }

    if !plan.failures.is_empty() {
        println!();
        println!("{}:", "Unreadable".bold());
        for failure in &plan.failures {
            println!("  {} {}", "!".red(), failure);
        }
    }
}
