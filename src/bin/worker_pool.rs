//! Paywire worker pool.
//!
//! Claims pending webhook events from PostgreSQL and processes them until
//! CTRL+C/SIGTERM or a fatal worker error. Exits non-zero on the latter.

use std::sync::Arc;

use anyhow::{Context, Result};
use paywire::{cancel_on_shutdown_signal, connect_storage, init_tracing, run_worker_pool};
use paywire_api::Config;
use paywire_core::RealClock;
use paywire_worker::PostgresEventStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    let worker_config = config.to_worker_config();
    info!(
        workers = worker_config.worker_count,
        poll_interval_ms = worker_config.poll_interval.as_millis(),
        process_delay_ms = worker_config.process_delay.as_millis(),
        "starting paywire worker pool"
    );

    let storage = connect_storage(&config).await?;
    let store = Arc::new(PostgresEventStore::new(storage.clone()));

    let shutdown = CancellationToken::new();
    cancel_on_shutdown_signal(shutdown.clone());

    let result = run_worker_pool(store, worker_config, Arc::new(RealClock::new()), &shutdown).await;

    storage.pool().close().await;

    if let Err(e) = &result {
        error!(error = %e, "worker pool stopped with error");
    } else {
        info!("worker pool stopped");
    }
    result.context("worker pool failed")
}
