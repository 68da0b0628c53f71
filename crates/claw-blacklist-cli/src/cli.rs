//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Claw blacklist - brute-force blocking for Clawbernetes endpoints.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-blacklist")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// One address per line.
    #[default]
    Text,
    /// JSON array for scripting.
    Json,
}

/// Location of the JSON configuration file.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the blacklist configuration (JSON).
    #[arg(short, long, env = "CLAW_BLACKLIST_CONFIG")]
    pub config: PathBuf,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Replay the persisted list into the firewall.
    ///
    /// Rules already present are left alone, so running this repeatedly
    /// is safe.
    Reconcile {
        /// Configuration location.
        #[command(flatten)]
        config: ConfigArgs,

        /// Report what would be blocked without touching the firewall.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and the persisted list.
    Check {
        /// Configuration location.
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the persisted blocked addresses.
    List {
        /// Configuration location.
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}
