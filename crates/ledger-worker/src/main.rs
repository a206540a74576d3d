//! Credit ledger worker - Main entry point.
//!
//! Reads usage and purchase events as JSON lines on stdin and writes one
//! JSON result line per event to stdout. Logs go to stderr.

mod config;
mod error;
mod events;

use crate::config::Config;
use crate::error::WorkerResult;
use anyhow::Context;
use credit_ledger::{open_ledger, LogNotifier, MemoryDirectory};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> WorkerResult<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.worker.log_level);

    info!("Starting credit ledger worker...");

    let directory = match &config.directory.path {
        Some(path) => {
            let directory = MemoryDirectory::load(path).await?;
            info!("Loaded directory from {:?}", path);
            directory
        }
        None => {
            warn!("No directory configured - only personal balances can pay");
            MemoryDirectory::new()
        }
    };

    let ledger = open_ledger(
        config.ledger.clone(),
        config.storage.path.clone(),
        directory,
        Arc::new(LogNotifier),
    )
    .await?;

    info!(
        "Ledger ready (sms_credits_enabled={}, price_per_seat={})",
        config.ledger.sms_credits_enabled, config.ledger.price_per_seat
    );
    info!("Listening for events on stdin...");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    // Main event loop
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = events::handle_line(&ledger, &line).await;
                if let Some(e) = &response.error {
                    error!("Event failed: {}", e);
                }

                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down...");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
