//! Git Privacy Manager CLI
//!
//! Keeps an encrypted, publishable mirror of a working tree in sync with
//! its plaintext.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;
use gpm_core::{CancelToken, Direction};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::Context;
use error::{EXIT_INTERRUPTED, Result};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    if let Err(e) = run(cli, cancel) {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
    tracing::debug!("Verbose mode enabled");
}

/// First Ctrl-C lets in-flight actions finish, a second one exits at once.
fn install_interrupt_handler(cancel: CancelToken) {
    let spawned = std::thread::Builder::new()
        .name("gpm-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not install Ctrl-C handler");
                    return;
                }
            };
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!(
                    "{} finishing in-flight actions, press Ctrl-C again to abort",
                    "interrupted:".yellow().bold()
                );
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(EXIT_INTERRUPTED);
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Could not spawn signal thread");
    }
}

fn run(cli: Cli, cancel: CancelToken) -> Result<()> {
    let Some(command) = cli.command else {
        println!("{} Git Privacy Manager", "gpm".green().bold());
        println!();
        println!("Run {} for available commands.", "gpm --help".cyan());
        return Ok(());
    };

    let load = |jobs: Option<usize>| {
        Context::load(
            cli.directory.as_deref(),
            cli.output.as_deref(),
            jobs,
            cli.passphrase.clone(),
        )
    };

    match command {
        Commands::Init { adapter } => {
            let root = match &cli.directory {
                Some(dir) => dir.clone(),
                None => std::env::current_dir()?,
            };
            commands::run_init(&root, &adapter)
        }
        Commands::Encrypt { dry_run, jobs } => {
            commands::run_sync(&load(jobs)?, Direction::Encrypt, dry_run, cancel)
        }
        Commands::Decrypt { dry_run, jobs } => {
            commands::run_sync(&load(jobs)?, Direction::Decrypt, dry_run, cancel)
        }
        Commands::Status { direction, json } => commands::run_status(&load(None)?, direction.into(), json),
        Commands::Gc { dry_run } => commands::run_gc(&load(None)?, dry_run),
    }
}
