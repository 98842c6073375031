//! HTTP request handlers for the paywire API.
//!
//! - `ingest` - payment webhook ingestion
//! - `health` - health, readiness and liveness probes
//!
//! Rejections use the `{"code","message"}` body with the HTTP status
//! repeated as `code`. Messages never carry storage details; those go to
//! the logs together with the `E`-prefixed error code.

pub mod health;
pub mod ingest;

pub use health::{health_check, liveness_check, readiness_check};
pub use ingest::ingest_payment_webhook;
