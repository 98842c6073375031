//! Paywire ingestion server.
//!
//! Accepts payment webhooks over HTTP and records them in PostgreSQL for the
//! worker pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use paywire::{connect_storage, init_tracing, shutdown_signal};
use paywire_api::{AppState, Config};
use paywire_core::RealClock;
use paywire_worker::PostgresEventStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!("starting paywire ingestion server");

    let addr = config.parse_server_addr()?;
    info!(
        database_url = %config.database_url_masked(),
        server_addr = %addr,
        max_connections = config.database_max_connections,
        "configuration loaded"
    );

    let storage = connect_storage(&config).await?;
    let state = AppState::new(
        Arc::new(PostgresEventStore::new(storage.clone())),
        Arc::new(RealClock::new()),
    );

    paywire_api::start_server(state, addr, config.request_timeout(), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    storage.pool().close().await;
    info!("database connections closed");

    info!("paywire shutdown complete");
    Ok(())
}
