//! Core domain models, errors and persistence for paywire.
//!
//! Provides the webhook event record and its claim/resolve state machine, the
//! error taxonomy shared by the API and the worker pool, a `Clock` abstraction
//! and the PostgreSQL repository. Every other crate builds on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, PaywireError, Result};
pub use models::{EventId, EventStatus, NewWebhookEvent, WebhookEvent};
pub use storage::Storage;
pub use time::{Clock, RealClock, TestClock};
