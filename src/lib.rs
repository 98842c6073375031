//! Process bootstrap shared by the paywire binaries.
//!
//! `paywire-server`, `paywire-worker-pool` and `paywire-loadsim` all start
//! the same way: load [`Config`], initialise tracing, and for the first two,
//! connect to PostgreSQL and make sure the schema exists.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use paywire_api::Config;
use paywire_core::{Clock, Storage};
use paywire_worker::{EventStore, SimulatedProcessor, WorkerConfig, WorkerError, WorkerPool};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod loadsim;

const MAX_CONNECT_RETRIES: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Initializes tracing.
///
/// `RUST_LOG` wins over `default_filter`, which usually comes from
/// [`Config::rust_log`].
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Creates the database connection pool with retry logic.
///
/// # Errors
///
/// Returns an error once every attempt failed or the connection cannot be
/// verified.
pub async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .idle_timeout(Duration::from_secs(config.database_idle_timeout))
            .max_lifetime(Duration::from_secs(config.database_max_lifetime))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(e) if retries < MAX_CONNECT_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_CONNECT_RETRIES,
                    error = %e,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Connects to PostgreSQL and creates the schema if needed.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the schema cannot be
/// created.
pub async fn connect_storage(config: &Config) -> Result<Arc<Storage>> {
    info!(database_url = %config.database_url_masked(), "connecting to database");

    let pool = create_database_pool(config).await?;
    let storage = Storage::new(pool);
    storage.run_migrations().await.context("Failed to run database migrations")?;

    info!("database ready");
    Ok(Arc::new(storage))
}

/// Runs a worker pool over `store` until `shutdown` is cancelled or a worker
/// fails fatally.
///
/// Processing is simulated: each event is logged and held for
/// `config.process_delay`.
///
/// # Errors
///
/// Returns the first fatal worker error, or `WorkerError::ShutdownTimeout`
/// when workers do not stop within `config.shutdown_timeout`.
pub async fn run_worker_pool(
    store: Arc<dyn EventStore>,
    config: WorkerConfig,
    clock: Arc<dyn Clock>,
    shutdown: &CancellationToken,
) -> std::result::Result<(), WorkerError> {
    let processor = Arc::new(SimulatedProcessor::new(config.process_delay, clock.clone()));
    let shutdown_timeout = config.shutdown_timeout;

    let mut pool = WorkerPool::new(store, processor, config, clock, shutdown)?;
    pool.spawn_workers().await?;

    // Child of `shutdown`, also cancelled by the pool on a fatal worker error.
    pool.cancellation_token().cancelled().await;

    pool.shutdown_graceful(shutdown_timeout).await
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C signal");
        },
        () = terminate => {
            info!("received SIGTERM signal");
        },
    }
}

/// Cancels `token` on CTRL+C or SIGTERM.
pub fn cancel_on_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}
