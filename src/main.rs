// This is the entry point of the ban tracker.
//
// **Architecture Overview:**
// - `core/` = Business logic (transport-agnostic)
// - `infra/` = Implementations of core traits (SQLite, JSON files)
// - `relay/` = Transport adapter (JSON lines in, IRC lines out)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background review sweep
// 4. Pump inbound events until the input closes or we get Ctrl-C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "relay/relay_layer.rs"]
mod relay;

use crate::core::tracking::{BanTrackerService, TrackerConfig};
use crate::infra::reviews::JsonReviewCache;
use crate::infra::tracking::SqliteRecordStore;
use crate::relay::events;
use crate::relay::Outbox;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_CONFIG_PATH: &str = "data/bantracker.json";
const DEFAULT_SWEEP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries outbound messages
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("BANTRACKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let sweep_secs = std::env::var("BANTRACKER_SWEEP_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SWEEP_SECS);

    let config = Arc::new(
        TrackerConfig::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path))?,
    );
    config.log_channels();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let store = SqliteRecordStore::new(&config.database)
        .await
        .context("Failed to initialize SQLite store")?;
    let reviews = JsonReviewCache::open(&config.review_cache).await;
    let tracker = Arc::new(BanTrackerService::new(store, reviews));

    let (outbox, writer) = Outbox::spawn_stdout();

    // Background review sweep. Forwarded reviews go out right away; direct
    // ones wait in the cache until the operator is seen.
    let sweeper = {
        let tracker = Arc::clone(&tracker);
        let config = Arc::clone(&config);
        let outbox = outbox.clone();
        tokio::spawn(async move {
            loop {
                tracing::debug!("Starting review sweep...");
                match tracker.run_review_sweep(&config, chrono::Utc::now()).await {
                    Ok(report) => {
                        if report.failed > 0 {
                            tracing::warn!(failed = report.failed, "Review sweep was incomplete");
                        }
                        outbox.send(report.forwarded);
                    }
                    Err(e) => tracing::error!("Review sweep failed: {}", e),
                }
                tokio::time::sleep(Duration::from_secs(sweep_secs)).await;
            }
        })
    };

    tracing::info!(config = %config_path, sweep_secs, "Ban tracker is ready");

    // ========================================================================
    // INBOUND LOOP
    // ========================================================================

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let replies = events::handle_line(&*tracker, &config, &line).await;
                    outbox.send(replies);
                }
                Ok(None) => {
                    tracing::info!("Input closed, shutting down");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    sweeper.abort();
    let _ = sweeper.await;

    tracker
        .close()
        .await
        .context("Failed to flush review cache")?;

    // Let the writer drain whatever is still queued
    drop(outbox);
    let _ = writer.await;

    Ok(())
}
