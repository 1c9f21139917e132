//! Command-line interface definition for `caseworkd`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// The casework dispatch daemon.
#[derive(Parser)]
#[command(name = "caseworkd", version, about = "Message-dispatch daemon with hot-loaded logic modules")]
pub struct Cli {
    /// Data directory (defaults to $CASEWORK_DATA_DIR or ~/.casework).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dispatch daemon until interrupted.
    Run {
        /// Bridge tracing spans to OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },

    /// Print the effective configuration as TOML.
    Config,

    /// Show recent processing-status ledger records.
    Status {
        /// Maximum number of records to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}
