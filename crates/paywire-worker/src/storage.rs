//! Event store abstraction consumed by workers and the ingestion endpoint.
//!
//! Production uses `PostgresEventStore` over `paywire_core::storage::Storage`.
//! `memory::MemoryEventStore` keeps everything behind one mutex and is used by
//! tests and local runs without a database.

use std::{future::Future, pin::Pin, sync::Arc};

use paywire_core::{
    error::Result,
    models::{EventId, NewWebhookEvent, WebhookEvent},
    storage::Storage,
};

/// Storage operations of the claim/resolve protocol.
///
/// Implementations must make `claim_next` exclusive: concurrent callers never
/// receive the same event. Resolutions only apply to events currently in
/// `processing` and fail with `CoreError::NotFound` otherwise.
pub trait EventStore: Send + Sync + 'static {
    /// Persists a new event in `pending`.
    ///
    /// Fails with `CoreError::ConstraintViolation` when the store enforces
    /// `event_id` uniqueness and the ID is taken.
    fn create(
        &self,
        new_event: NewWebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>>;

    /// Claims the oldest pending event, moving it to `processing`.
    ///
    /// `Ok(None)` means the backlog is empty. That is not an error.
    fn claim_next(&self) -> Pin<Box<dyn Future<Output = Result<Option<WebhookEvent>>> + Send + '_>>;

    /// Resolves a claimed event as `done`.
    fn mark_done(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>>;

    /// Resolves a claimed event as `failed` with `error_message` as
    /// `last_error`.
    fn mark_failed(
        &self,
        id: EventId,
        error_message: String,
    ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>>;

    /// Reads an event by storage ID.
    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookEvent>>> + Send + '_>>;

    /// Checks that the backing store is reachable.
    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// PostgreSQL-backed store.
pub struct PostgresEventStore {
    storage: Arc<Storage>,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl EventStore for PostgresEventStore {
    fn create(
        &self,
        new_event: NewWebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_events.create(new_event).await })
    }

    fn claim_next(&self) -> Pin<Box<dyn Future<Output = Result<Option<WebhookEvent>>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_events.claim_next().await })
    }

    fn mark_done(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_events.mark_done(id).await })
    }

    fn mark_failed(
        &self,
        id: EventId,
        error_message: String,
    ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_events.mark_failed(id, &error_message).await })
    }

    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookEvent>>> + Send + '_>> {
        Box::pin(async move { self.storage.webhook_events.find_by_id(id).await })
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.storage.health_check().await })
    }
}

pub mod memory {
    //! In-memory event store.
    //!
    //! A single `tokio::sync::Mutex` guards the event map and the pending
    //! queue, so a claim is one critical section and can never hand the same
    //! event to two workers. Supports one-shot error injection for each store
    //! call to exercise failure paths deterministically.

    use std::{
        collections::{HashMap, VecDeque},
        future::Future,
        pin::Pin,
        sync::Arc,
    };

    use paywire_core::{
        error::{CoreError, Result},
        models::{EventStatus, NewWebhookEvent},
        Clock, RealClock,
    };
    use tokio::sync::Mutex;

    use super::{EventId, EventStore, WebhookEvent};

    #[derive(Default)]
    struct MemoryState {
        events: HashMap<EventId, WebhookEvent>,
        pending: VecDeque<EventId>,
        create_error: Option<String>,
        claim_error: Option<String>,
        mark_done_error: Option<String>,
        mark_failed_error: Option<String>,
    }

    impl MemoryState {
        fn resolve(
            &mut self,
            id: EventId,
            next: EventStatus,
            last_error: Option<String>,
            now: chrono::DateTime<chrono::Utc>,
        ) -> Result<WebhookEvent> {
            let event = self
                .events
                .get_mut(&id)
                .filter(|event| event.status.can_transition_to(next))
                .ok_or_else(|| CoreError::NotFound(format!("event {id} is not in processing")))?;

            event.status = next;
            event.last_error = last_error;
            event.updated_at = now;
            Ok(event.clone())
        }
    }

    /// In-memory store for tests and database-less runs.
    pub struct MemoryEventStore {
        state: Mutex<MemoryState>,
        clock: Arc<dyn Clock>,
        unique_event_ids: bool,
    }

    impl MemoryEventStore {
        /// Creates an empty store stamping times from the system clock.
        pub fn new() -> Self {
            Self::with_clock(Arc::new(RealClock::new()))
        }

        /// Creates an empty store stamping times from `clock`.
        pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
            Self { state: Mutex::new(MemoryState::default()), clock, unique_event_ids: false }
        }

        /// Rejects `create` for an `event_id` that is already stored.
        #[must_use]
        pub fn with_unique_event_ids(mut self) -> Self {
            self.unique_event_ids = true;
            self
        }

        /// Fails the next `create` with a database error.
        pub async fn inject_create_error(&self, error: impl Into<String>) {
            self.state.lock().await.create_error = Some(error.into());
        }

        /// Fails the next `claim_next` with a database error.
        pub async fn inject_claim_error(&self, error: impl Into<String>) {
            self.state.lock().await.claim_error = Some(error.into());
        }

        /// Fails the next `mark_done` with a database error.
        pub async fn inject_mark_done_error(&self, error: impl Into<String>) {
            self.state.lock().await.mark_done_error = Some(error.into());
        }

        /// Fails the next `mark_failed` with a database error.
        pub async fn inject_mark_failed_error(&self, error: impl Into<String>) {
            self.state.lock().await.mark_failed_error = Some(error.into());
        }

        /// Returns a snapshot of the event with storage ID `id`.
        pub async fn event(&self, id: EventId) -> Option<WebhookEvent> {
            self.state.lock().await.events.get(&id).cloned()
        }

        /// Returns snapshots of every event recorded under `event_id`.
        pub async fn events_by_event_id(&self, event_id: &str) -> Vec<WebhookEvent> {
            let state = self.state.lock().await;
            let mut events: Vec<_> =
                state.events.values().filter(|e| e.event_id == event_id).cloned().collect();
            events.sort_by_key(|e| e.created_at);
            events
        }

        /// Counts events currently in `status`.
        pub async fn count_by_status(&self, status: EventStatus) -> usize {
            self.state.lock().await.events.values().filter(|e| e.status == status).count()
        }

        /// Total number of stored events.
        pub async fn len(&self) -> usize {
            self.state.lock().await.events.len()
        }

        /// Whether the store holds no events.
        pub async fn is_empty(&self) -> bool {
            self.state.lock().await.events.is_empty()
        }
    }

    impl Default for MemoryEventStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EventStore for MemoryEventStore {
        fn create(
            &self,
            new_event: NewWebhookEvent,
        ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state.lock().await;

                if let Some(error) = state.create_error.take() {
                    return Err(CoreError::Database(error));
                }

                if self.unique_event_ids
                    && state.events.values().any(|e| e.event_id == new_event.event_id)
                {
                    return Err(CoreError::ConstraintViolation(format!(
                        "event_id {} already exists",
                        new_event.event_id
                    )));
                }

                let event = WebhookEvent::pending(new_event, self.clock.now());
                state.pending.push_back(event.id);
                state.events.insert(event.id, event.clone());
                Ok(event)
            })
        }

        fn claim_next(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookEvent>>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state.lock().await;

                if let Some(error) = state.claim_error.take() {
                    return Err(CoreError::Database(error));
                }

                let now = self.clock.now();
                while let Some(id) = state.pending.pop_front() {
                    if let Some(event) = state.events.get_mut(&id) {
                        if event.status == EventStatus::Pending {
                            event.status = EventStatus::Processing;
                            event.updated_at = now;
                            return Ok(Some(event.clone()));
                        }
                    }
                }

                Ok(None)
            })
        }

        fn mark_done(
            &self,
            id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state.lock().await;

                if let Some(error) = state.mark_done_error.take() {
                    return Err(CoreError::Database(error));
                }

                state.resolve(id, EventStatus::Done, None, self.clock.now())
            })
        }

        fn mark_failed(
            &self,
            id: EventId,
            error_message: String,
        ) -> Pin<Box<dyn Future<Output = Result<WebhookEvent>> + Send + '_>> {
            Box::pin(async move {
                let mut state = self.state.lock().await;

                if let Some(error) = state.mark_failed_error.take() {
                    return Err(CoreError::Database(error));
                }

                state.resolve(id, EventStatus::Failed, Some(error_message), self.clock.now())
            })
        }

        fn find_event(
            &self,
            id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<WebhookEvent>>> + Send + '_>> {
            Box::pin(async move { Ok(self.event(id).await) })
        }

        fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

}
