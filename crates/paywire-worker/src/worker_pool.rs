//! Worker pool management with structured concurrency.
//!
//! Spawns `worker_count` workers over one shared store, processor and
//! cancellation token. The token is a child of the caller's, so an external
//! stop reaches every worker while a fatal worker error cancels only this
//! pool. The first fatal error is kept and surfaced once all workers stopped.

use std::{sync::Arc, time::Duration};

use paywire_core::Clock;
use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{Result, WorkerError},
    processor::EventProcessor,
    storage::EventStore,
    worker::{Worker, WorkerConfig},
};

/// Counters for pool monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Workers currently running.
    pub active_workers: usize,
    /// Events claimed since startup.
    pub events_claimed: u64,
    /// Events resolved as `done`.
    pub events_done: u64,
    /// Events resolved as `failed`.
    pub events_failed: u64,
    /// Claimed events whose resolution failed; they remain in `processing`.
    pub orphaned_claims: u64,
}

/// Supervised set of workers.
pub struct WorkerPool {
    store: Arc<dyn EventStore>,
    processor: Arc<dyn EventProcessor>,
    config: WorkerConfig,
    stats: Arc<RwLock<PoolStats>>,
    cancellation_token: CancellationToken,
    first_error: Arc<Mutex<Option<WorkerError>>>,
    worker_handles: Vec<(usize, JoinHandle<Result<()>>)>,
    clock: Arc<dyn Clock>,
}

impl WorkerPool {
    /// Creates a pool whose workers stop when `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if `config` is invalid.
    pub fn new(
        store: Arc<dyn EventStore>,
        processor: Arc<dyn EventProcessor>,
        config: WorkerConfig,
        clock: Arc<dyn Clock>,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            processor,
            config,
            stats: Arc::new(RwLock::new(PoolStats::default())),
            cancellation_token: shutdown.child_token(),
            first_error: Arc::new(Mutex::new(None)),
            worker_handles: Vec::new(),
            clock,
        })
    }

    /// Spawns all configured workers with IDs `1..=worker_count`.
    ///
    /// Returns immediately after spawning.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if workers were already spawned.
    pub async fn spawn_workers(&mut self) -> Result<()> {
        if !self.worker_handles.is_empty() {
            return Err(WorkerError::configuration("workers already spawned"));
        }

        info!(
            worker_count = self.config.worker_count,
            poll_interval_ms = self.config.poll_interval.as_millis(),
            process_delay_ms = self.config.process_delay.as_millis(),
            "starting worker pool"
        );

        self.stats.write().await.active_workers = self.config.worker_count;

        for worker_id in 1..=self.config.worker_count {
            let worker = Worker::new(
                worker_id,
                self.store.clone(),
                self.processor.clone(),
                self.config.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
                self.clock.clone(),
            );
            let stats = self.stats.clone();
            let token = self.cancellation_token.clone();
            let first_error = self.first_error.clone();

            let handle = tokio::spawn(async move {
                info!(worker_id, "worker starting");

                // Inner task so a panic is observed here and can stop the pool.
                let result = match tokio::spawn(async move { worker.run().await }).await {
                    Ok(result) => result,
                    Err(join_error) => {
                        Err(WorkerError::WorkerPanic { worker_id, error: join_error.to_string() })
                    },
                };

                stats.write().await.active_workers -= 1;

                match &result {
                    Ok(()) => info!(worker_id, "worker stopped gracefully"),
                    Err(error) => {
                        error!(worker_id, error = %error, "worker terminated with error");
                        record_first_error(&first_error, error.clone()).await;
                        token.cancel();
                    },
                }

                result
            });

            self.worker_handles.push((worker_id, handle));
        }

        Ok(())
    }

    /// Waits until every worker has stopped.
    ///
    /// Workers stop on external cancellation or after the first fatal error,
    /// which cancels the rest.
    ///
    /// # Errors
    ///
    /// Returns the first fatal worker error. Cancellation alone is `Ok(())`.
    pub async fn wait(&mut self) -> Result<()> {
        for (worker_id, handle) in std::mem::take(&mut self.worker_handles) {
            if let Err(join_error) = handle.await {
                error!(worker_id, error = %join_error, "worker supervisor task failed");
                record_first_error(
                    &self.first_error,
                    WorkerError::WorkerPanic { worker_id, error: join_error.to_string() },
                )
                .await;
                self.cancellation_token.cancel();
            }
        }

        match self.first_error.lock().await.take() {
            Some(error) => Err(error),
            None => {
                info!("worker pool stopped");
                Ok(())
            },
        }
    }

    /// Cancels all workers and waits up to `timeout` for them to stop.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::ShutdownTimeout` if workers are still running
    /// after `timeout`, or the first fatal error a worker hit before stopping.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_ms = timeout.as_millis(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_elapsed) => {
                error!(
                    timeout_ms = timeout.as_millis(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(WorkerError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Check if any workers are still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|(_, h)| !h.is_finished())
    }

    /// Snapshot of the pool counters.
    pub async fn stats(&self) -> PoolStats {
        self.stats.read().await.clone()
    }

    /// The pool's own cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }
}

async fn record_first_error(slot: &Mutex<Option<WorkerError>>, error: WorkerError) {
    let mut slot = slot.lock().await;
    if slot.is_none() {
        *slot = Some(error);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active_count = self.worker_handles.iter().filter(|(_, h)| !h.is_finished()).count();

        if active_count > 0 && !self.cancellation_token.is_cancelled() {
            error!(
                active_workers = active_count,
                "WorkerPool dropped with active workers, forcing cancellation"
            );

            self.cancellation_token.cancel();

            warn!("call shutdown_graceful() or wait() before dropping a WorkerPool");
        }
    }
}
