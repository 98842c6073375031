//! Error types for the worker pool.
//!
//! Separates failures that stop a worker (storage outside a claim, panics,
//! bad configuration) from failures scoped to one claimed event, which are
//! recorded on the event and never stop the loop.

use std::time::Duration;

use paywire_core::CoreError;
use thiserror::Error;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors surfaced by workers and the pool.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// Store call failed outside a claim/resolve pair.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// Business processing of a claimed event failed.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// Invalid pool or worker configuration.
    #[error("invalid worker configuration: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },

    /// Workers did not stop within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// A worker task panicked or was aborted.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// ID of the worker whose task failed
        worker_id: usize,
        /// Join error description
        error: String,
    },
}

impl WorkerError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

/// Failure of business processing for one claimed event.
///
/// The display text is what ends up in the event's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The processor rejected or could not handle the event.
    #[error("{message}")]
    Failed {
        /// Diagnostic recorded on the event
        message: String,
    },

    /// Shutdown arrived while the event was being processed.
    #[error("processing interrupted by shutdown")]
    Interrupted,
}

impl ProcessingError {
    /// Creates a processing failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { message: message.into() }
    }
}
