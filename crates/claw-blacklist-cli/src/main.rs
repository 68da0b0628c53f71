//! `claw-blacklist` binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use claw_blacklist_cli::cli::{Cli, Commands};
use claw_blacklist_cli::commands;

fn main() -> ExitCode {
    // Initialize tracing, defaulting to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Reconcile { config, dry_run } => {
            commands::reconcile(&mut stdout, &config.config, dry_run)
        }
        Commands::Check { config } => commands::check(&mut stdout, &config.config),
        Commands::List { config, format } => commands::list(&mut stdout, &config.config, format),
    }
}
