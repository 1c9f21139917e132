//! casework dispatch daemon entry point.
//!
//! Binary name: `caseworkd`
//!
//! Parses CLI arguments, initializes the pipeline, and either runs the
//! dispatcher or executes an operational command.

mod cli;
mod state;
mod supervisor;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use casework_core::ledger::ProcessingStatusLedger;
use casework_infra::config::{data_dir, load_service_config};
use casework_infra::sqlite::{DatabasePool, SqliteStatusLedger, default_database_url};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(data_dir);

    match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "caseworkd", &mut std::io::stdout());
            Ok(())
        }

        Commands::Run { otel } => {
            casework_observe::tracing_setup::init_tracing(otel)
                .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

            let state = AppState::init(&data_dir).await?;
            let result = supervisor::run(state).await;
            casework_observe::tracing_setup::shutdown_tracing();
            result
        }

        Commands::Config => {
            init_cli_tracing(cli.verbose);
            let config = load_service_config(&data_dir).await;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }

        Commands::Status { limit } => {
            init_cli_tracing(cli.verbose);
            let config = load_service_config(&data_dir).await;
            let database_url = config.database_url.unwrap_or_else(default_database_url);
            let pool = DatabasePool::new(&database_url).await?;
            let ledger = SqliteStatusLedger::new(pool);

            let records = ledger
                .recent(limit)
                .await
                .map_err(|e| anyhow::anyhow!("reading ledger: {e}"))?;
            if records.is_empty() {
                println!("no processing-status records");
                return Ok(());
            }
            for record in records {
                let detail = match (&record.error_class, &record.error_text) {
                    (Some(class), Some(text)) => format!("{class}: {text}"),
                    _ => String::new(),
                };
                println!(
                    "{}  {:5}  {}  {}",
                    record.recorded_at.to_rfc3339(),
                    record.outcome.to_string(),
                    record.message_id.as_deref().unwrap_or("-"),
                    detail
                );
            }
            Ok(())
        }
    }
}

/// Plain fmt tracing for one-shot CLI commands.
fn init_cli_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info,casework=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
