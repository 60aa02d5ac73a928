//! # Flight Aggregator Entry Point
//!
//! `serve` runs the HTTP API together with the background sync scheduler;
//! `sync` performs one catalog sync and exits.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use flight_aggregator::{
    config::ConfigLoader,
    db,
    server::{build_state, run_server},
    telemetry,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "flight-aggregator")]
#[command(about = "Multi-provider flight availability aggregator", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and run the sync scheduler (default)
    Serve,

    /// Sync the flight catalog once and exit
    Sync {
        /// Only sync the provider with this id or code
        #[arg(long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    telemetry::init_tracing(&config).context("Failed to initialise tracing")?;
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Loaded configuration");
    }

    let db = db::init_pool(&config).await?;
    db::migrate(&db).await?;
    let state = build_state(Arc::new(config), db).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let shutdown = CancellationToken::new();
            let scheduler = state.config.scheduler.enabled.then(|| {
                tokio::spawn(Arc::clone(&state.scheduler).run(shutdown.child_token()))
            });

            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received");
                }
                signal_token.cancel();
            });

            let served = run_server(state, shutdown.clone()).await;
            shutdown.cancel();
            if let Some(handle) = scheduler {
                let _ = handle.await;
            }
            served
        }
        Command::Sync { provider: None } => {
            let results = state.scheduler.sync_all().await;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Command::Sync {
            provider: Some(selector),
        } => {
            let registry = state.aggregator.registry();
            let provider = match Uuid::parse_str(&selector) {
                Ok(id) => registry.get(id).ok(),
                Err(_) => registry.get_by_code(&selector),
            };
            let Some(provider) = provider else {
                bail!("no registered provider matches '{selector}'");
            };
            let result = state.scheduler.sync_provider(provider.id()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
