//! Business processing of claimed events.
//!
//! The worker owns claiming, resolution and cancellation; a processor only
//! decides whether one event was handled. `SimulatedProcessor` stands in for
//! the real payment handler: it logs the decoded payload and waits.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use paywire_core::{models::WebhookEvent, Clock};
use serde_json::Value;
use tracing::debug;

use crate::error::ProcessingError;

/// Handles one claimed event.
///
/// Returning `Err` resolves the event as `failed` with the error text as
/// `last_error`. The worker drops the future if shutdown arrives first.
pub trait EventProcessor: Send + Sync + 'static {
    /// Processes `event`.
    fn process<'a>(
        &'a self,
        event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessingError>> + Send + 'a>>;
}

/// Placeholder processor: decode, log, wait `delay`, succeed.
#[derive(Debug, Clone)]
pub struct SimulatedProcessor {
    delay: Duration,
    clock: Arc<dyn Clock>,
}

impl SimulatedProcessor {
    /// Creates a processor that takes `delay` per event.
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { delay, clock }
    }
}

impl EventProcessor for SimulatedProcessor {
    fn process<'a>(
        &'a self,
        event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessingError>> + Send + 'a>> {
        Box::pin(async move {
            // Undecodable payloads are processed as empty.
            let payload = event.payload_json().unwrap_or(Value::Null);

            debug!(event_id = %event.event_id, payload = %payload, "simulating webhook handler");

            self.clock.sleep(self.delay).await;
            Ok(())
        })
    }
}
