//! Single worker loop: claim, process, resolve.
//!
//! A worker holds no state across iterations besides its ID. Waiting on an
//! empty backlog and processing both race the cancellation token so shutdown
//! is observed within one poll interval or one processing delay.

use std::{sync::Arc, time::Duration};

use paywire_core::{models::WebhookEvent, Clock};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{ProcessingError, Result, WorkerError},
    processor::EventProcessor,
    storage::EventStore,
    worker_pool::PoolStats,
};

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,

    /// Wait after finding an empty backlog.
    pub poll_interval: Duration,

    /// Simulated processing time per event.
    pub process_delay: Duration,

    /// Maximum time `shutdown_graceful` waits for workers.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            poll_interval: crate::DEFAULT_POLL_INTERVAL,
            process_delay: crate::DEFAULT_PROCESS_DELAY,
            shutdown_timeout: crate::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl WorkerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` if `worker_count` is zero or the
    /// poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(WorkerError::configuration("worker_count must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(WorkerError::configuration("poll_interval must be greater than zero"));
        }
        Ok(())
    }
}

/// One competing consumer of the event backlog.
pub struct Worker {
    id: usize,
    store: Arc<dyn EventStore>,
    processor: Arc<dyn EventProcessor>,
    config: WorkerConfig,
    stats: Arc<RwLock<PoolStats>>,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl Worker {
    /// Creates a worker. `id` is used for logging only.
    pub fn new(
        id: usize,
        store: Arc<dyn EventStore>,
        processor: Arc<dyn EventProcessor>,
        config: WorkerConfig,
        stats: Arc<RwLock<PoolStats>>,
        cancellation_token: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { id, store, processor, config, stats, cancellation_token, clock }
    }

    /// Worker ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Main worker loop - claims and processes events until cancelled.
    ///
    /// Cancellation is a clean stop and returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Storage` if claiming fails. Errors while
    /// processing or resolving a claimed event are logged and the loop
    /// continues.
    pub async fn run(&self) -> Result<()> {
        debug!(worker_id = self.id, "worker loop starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "worker received shutdown signal");
                break;
            }

            match self.store.claim_next().await {
                Ok(Some(event)) => {
                    self.stats.write().await.events_claimed += 1;
                    info!(
                        worker_id = self.id,
                        event_id = %event.event_id,
                        id = %event.id,
                        "claimed webhook"
                    );

                    if let Err(error) = self.process_event(&event).await {
                        warn!(
                            worker_id = self.id,
                            event_id = %event.event_id,
                            error = %error,
                            "processing failed"
                        );
                    }
                },
                Ok(None) => {
                    debug!(worker_id = self.id, "backlog empty");
                    tokio::select! {
                        () = self.clock.sleep(self.config.poll_interval) => {},
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
                Err(error) => {
                    error!(worker_id = self.id, error = %error, "failed to claim webhook");
                    return Err(WorkerError::Storage(error));
                },
            }
        }

        Ok(())
    }

    /// Processes one claimed event and drives it to `done` or `failed`.
    ///
    /// # Errors
    ///
    /// Returns the processing error, or the `mark_done` error, after the
    /// event has been resolved as failed. These are per-event and never
    /// fatal.
    async fn process_event(&self, event: &WebhookEvent) -> Result<()> {
        info!(
            worker_id = self.id,
            event_id = %event.event_id,
            event_type = %event.event_type,
            "processing webhook"
        );

        let outcome = tokio::select! {
            biased;
            outcome = self.processor.process(event) => outcome,
            () = self.cancellation_token.cancelled() => Err(ProcessingError::Interrupted),
        };

        if let Err(error) = outcome {
            self.fail_event(event, error.to_string()).await;
            return Err(error.into());
        }

        match self.store.mark_done(event.id).await {
            Ok(_) => {
                self.stats.write().await.events_done += 1;
                info!(worker_id = self.id, event_id = %event.event_id, "webhook marked done");
                Ok(())
            },
            Err(error) => {
                self.fail_event(event, error.to_string()).await;
                Err(WorkerError::Storage(error))
            },
        }
    }

    /// Resolves `event` as failed. If that also fails the event stays in
    /// `processing` and is counted as orphaned.
    async fn fail_event(&self, event: &WebhookEvent, message: String) {
        match self.store.mark_failed(event.id, message).await {
            Ok(failed) => {
                self.stats.write().await.events_failed += 1;
                info!(
                    worker_id = self.id,
                    event_id = %event.event_id,
                    last_error = failed.last_error.as_deref().unwrap_or_default(),
                    "webhook marked failed"
                );
            },
            Err(error) => {
                self.stats.write().await.orphaned_claims += 1;
                warn!(
                    worker_id = self.id,
                    event_id = %event.event_id,
                    id = %event.id,
                    error = %error,
                    "could not resolve claimed webhook, left in processing"
                );
            },
        }
    }
}
