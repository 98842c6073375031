//! Claim-based job queue for payment webhook events.
//!
//! Workers compete for events in a shared backlog. Each iteration claims one
//! `pending` event (the store guarantees no two workers get the same one),
//! processes it and resolves it to `done` or `failed`:
//!
//! 1. **Claim** - `EventStore::claim_next`, or wait `poll_interval` when the
//!    backlog is empty
//! 2. **Process** - `EventProcessor::process`, raced against shutdown
//! 3. **Resolve** - `mark_done`, falling back to `mark_failed`
//!
//! Failed events are never re-queued. An event whose resolution call fails
//! stays in `processing` and is reported as an orphaned claim.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use paywire_core::{Clock, RealClock};
//! use paywire_worker::{
//!     memory::MemoryEventStore, SimulatedProcessor, WorkerConfig, WorkerError, WorkerPool,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), WorkerError> {
//! let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
//! let config = WorkerConfig::default();
//! let processor = Arc::new(SimulatedProcessor::new(config.process_delay, clock.clone()));
//! let shutdown = CancellationToken::new();
//!
//! let mut pool = WorkerPool::new(
//!     Arc::new(MemoryEventStore::new()),
//!     processor,
//!     config,
//!     clock,
//!     &shutdown,
//! )?;
//! pool.spawn_workers().await?;
//! pool.wait().await
//! # }
//! ```

use std::time::Duration;

pub mod error;
pub mod processor;
pub mod storage;
pub mod worker;
pub mod worker_pool;

pub use error::{ProcessingError, Result, WorkerError};
pub use processor::{EventProcessor, SimulatedProcessor};
pub use storage::{memory, EventStore, PostgresEventStore};
pub use worker::{Worker, WorkerConfig};
pub use worker_pool::{PoolStats, WorkerPool};

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default wait after an empty claim.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default simulated processing time per event.
pub const DEFAULT_PROCESS_DELAY: Duration = Duration::from_millis(100);

/// Default upper bound for graceful shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
