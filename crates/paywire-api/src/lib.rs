//! Paywire HTTP API.
//!
//! Accepts payment webhooks on `POST /webhooks/payments`, records them as
//! `pending` through the shared [`EventStore`] and acknowledges. Processing
//! happens later in the worker pool; the endpoint never waits for it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use paywire_core::Clock;
use paywire_worker::EventStore;

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Event store shared with the worker pool.
    pub store: Arc<dyn EventStore>,
    /// Time source for health reports.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates application state over `store` and `clock`.
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}
