//! Worker pool behaviour against the in-memory store.
//!
//! Covers the full claim/process/resolve loop: success, processing failure,
//! resolution failure, fatal claim errors, panics and shutdown.

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use paywire_core::{
    models::{EventId, EventStatus, NewWebhookEvent, WebhookEvent},
    Clock, RealClock,
};
use paywire_worker::{
    memory::MemoryEventStore, EventProcessor, EventStore, PoolStats, ProcessingError,
    SimulatedProcessor, WorkerConfig, WorkerError, WorkerPool,
};
use tokio_util::sync::CancellationToken;

/// Fails every event whose `event_id` starts with `bad_`.
struct SelectiveProcessor;

impl EventProcessor for SelectiveProcessor {
    fn process<'a>(
        &'a self,
        event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessingError>> + Send + 'a>> {
        Box::pin(async move {
            if event.event_id.starts_with("bad_") {
                Err(ProcessingError::failed(format!("cannot settle {}", event.event_id)))
            } else {
                Ok(())
            }
        })
    }
}

/// Panics on every event.
struct PanickingProcessor;

impl EventProcessor for PanickingProcessor {
    fn process<'a>(
        &'a self,
        _event: &'a WebhookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProcessingError>> + Send + 'a>> {
        Box::pin(async { panic!("ledger unavailable") })
    }
}

/// Delegates to the memory store but never completes `mark_failed`.
struct HangingResolutionStore {
    inner: Arc<MemoryEventStore>,
}

impl EventStore for HangingResolutionStore {
    fn create(
        &self,
        new_event: NewWebhookEvent,
    ) -> Pin<Box<dyn Future<Output = paywire_core::Result<WebhookEvent>> + Send + '_>> {
        self.inner.create(new_event)
    }

    fn claim_next(
        &self,
    ) -> Pin<Box<dyn Future<Output = paywire_core::Result<Option<WebhookEvent>>> + Send + '_>> {
        self.inner.claim_next()
    }

    fn mark_done(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = paywire_core::Result<WebhookEvent>> + Send + '_>> {
        self.inner.mark_done(id)
    }

    fn mark_failed(
        &self,
        _id: EventId,
        _error_message: String,
    ) -> Pin<Box<dyn Future<Output = paywire_core::Result<WebhookEvent>> + Send + '_>> {
        Box::pin(std::future::pending::<paywire_core::Result<WebhookEvent>>())
    }

    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = paywire_core::Result<Option<WebhookEvent>>> + Send + '_>> {
        self.inner.find_event(id)
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = paywire_core::Result<()>> + Send + '_>> {
        self.inner.health_check()
    }
}

/// Log sink shared with a scoped fmt subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn fast_config(worker_count: usize) -> WorkerConfig {
    WorkerConfig {
        worker_count,
        poll_interval: Duration::from_millis(20),
        process_delay: Duration::from_millis(5),
        shutdown_timeout: Duration::from_secs(5),
    }
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(RealClock::new())
}

fn start_pool(
    store: &Arc<MemoryEventStore>,
    processor: Arc<dyn EventProcessor>,
    config: WorkerConfig,
    shutdown: &CancellationToken,
) -> WorkerPool {
    WorkerPool::new(store.clone(), processor, config, clock(), shutdown).unwrap()
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_count(store: &MemoryEventStore, status: EventStatus, count: usize) {
    eventually(|| async move { store.count_by_status(status).await == count }).await;
}

async fn wait_for_status(store: &MemoryEventStore, id: EventId, status: EventStatus) {
    eventually(|| async move { store.event(id).await.is_some_and(|e| e.status == status) }).await;
}

async fn wait_for_stats(pool: &WorkerPool, predicate: impl Fn(&PoolStats) -> bool) {
    let predicate = &predicate;
    eventually(|| async move { predicate(&pool.stats().await) }).await;
}

async fn create(store: &MemoryEventStore, event_id: &str) -> WebhookEvent {
    store
        .create(NewWebhookEvent::new(event_id, "payment.completed", &br#"{"amount":"5000"}"#[..]))
        .await
        .unwrap()
}

#[tokio::test]
async fn pool_processes_backlog_to_done() {
    let store = Arc::new(MemoryEventStore::new());
    let event = create(&store, "evt_1").await;
    for i in 2..=20 {
        create(&store, &format!("evt_{i}")).await;
    }

    let shutdown = CancellationToken::new();
    let config = fast_config(5);
    let processor = Arc::new(SimulatedProcessor::new(config.process_delay, clock()));
    let mut pool = start_pool(&store, processor, config, &shutdown);
    pool.spawn_workers().await.unwrap();

    wait_for_count(&store, EventStatus::Done, 20).await;
    wait_for_stats(&pool, |stats| stats.events_done == 20).await;

    let stats = pool.stats().await;
    assert_eq!(stats.events_claimed, 20);
    assert_eq!(stats.events_done, 20);
    assert_eq!(stats.orphaned_claims, 0);

    let stored = store.event(event.id).await.unwrap();
    assert_eq!(stored.status, EventStatus::Done);
    assert_eq!(stored.last_error, None);

    pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn processing_failure_is_recorded_and_worker_continues() {
    let store = Arc::new(MemoryEventStore::new());
    let bad = create(&store, "bad_1").await;
    let good = create(&store, "evt_2").await;

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(SelectiveProcessor), fast_config(1), &shutdown);
    pool.spawn_workers().await.unwrap();

    wait_for_count(&store, EventStatus::Done, 1).await;

    let bad = store.event(bad.id).await.unwrap();
    assert_eq!(bad.status, EventStatus::Failed);
    assert_eq!(bad.last_error.as_deref(), Some("cannot settle bad_1"));
    assert_eq!(store.event(good.id).await.unwrap().status, EventStatus::Done);
    assert!(pool.has_active_workers());

    pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn processing_start_is_logged_by_the_worker() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    // Current-thread runtime: spawned workers share this thread's default.
    let _guard = tracing::subscriber::set_default(subscriber);

    let store = Arc::new(MemoryEventStore::new());
    create(&store, "evt_logged").await;

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(SelectiveProcessor), fast_config(1), &shutdown);
    pool.spawn_workers().await.unwrap();

    wait_for_count(&store, EventStatus::Done, 1).await;
    pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();

    let output = logs.contents();
    let line = output
        .lines()
        .find(|line| line.contains("processing webhook"))
        .expect("no processing log line");
    assert!(line.contains("evt_logged"), "{line}");
    assert!(line.contains("worker_id=1"), "{line}");
}

#[tokio::test]
async fn mark_done_failure_falls_back_to_failed() {
    let store = Arc::new(MemoryEventStore::new());
    let event = create(&store, "evt_1").await;
    store.inject_mark_done_error("connection reset by peer").await;

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(SelectiveProcessor), fast_config(1), &shutdown);
    pool.spawn_workers().await.unwrap();

    wait_for_count(&store, EventStatus::Failed, 1).await;

    let stored = store.event(event.id).await.unwrap();
    assert_eq!(
        stored.last_error.as_deref(),
        Some("Database error: connection reset by peer")
    );
    wait_for_stats(&pool, |stats| stats.events_failed == 1).await;

    pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn failed_resolution_leaves_orphaned_claim_and_worker_continues() {
    let store = Arc::new(MemoryEventStore::new());
    let orphan = create(&store, "evt_1").await;
    store.inject_mark_done_error("primary down").await;
    store.inject_mark_failed_error("primary down").await;

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(SelectiveProcessor), fast_config(1), &shutdown);
    pool.spawn_workers().await.unwrap();

    wait_for_stats(&pool, |stats| stats.orphaned_claims == 1).await;

    let next = create(&store, "evt_2").await;
    wait_for_status(&store, next.id, EventStatus::Done).await;

    let orphan = store.event(orphan.id).await.unwrap();
    assert_eq!(orphan.status, EventStatus::Processing);
    assert_eq!(orphan.last_error, None);

    pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn fatal_claim_error_stops_pool_and_is_surfaced() {
    let store = Arc::new(MemoryEventStore::new());
    store.inject_claim_error("too many connections").await;

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(SelectiveProcessor), fast_config(3), &shutdown);
    pool.spawn_workers().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), pool.wait())
        .await
        .expect("remaining workers should be cancelled");

    match result {
        Err(WorkerError::Storage(error)) => {
            assert!(error.to_string().contains("too many connections"));
        },
        other => panic!("expected storage error, got {other:?}"),
    }
    assert!(!shutdown.is_cancelled());
    assert_eq!(pool.stats().await.active_workers, 0);
}

#[tokio::test]
async fn worker_panic_surfaces_as_worker_panic() {
    let store = Arc::new(MemoryEventStore::new());
    create(&store, "evt_1").await;

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(PanickingProcessor), fast_config(2), &shutdown);
    pool.spawn_workers().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), pool.wait()).await.unwrap();

    assert!(matches!(result, Err(WorkerError::WorkerPanic { .. })));
}

#[tokio::test]
async fn idle_pool_picks_up_late_events() {
    let store = Arc::new(MemoryEventStore::new());

    let shutdown = CancellationToken::new();
    let mut pool = start_pool(&store, Arc::new(SelectiveProcessor), fast_config(2), &shutdown);
    pool.spawn_workers().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stats().await.events_claimed, 0);

    let late = create(&store, "evt_late").await;
    wait_for_status(&store, late.id, EventStatus::Done).await;

    pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn cancellation_mid_delay_drains_cleanly() {
    let store = Arc::new(MemoryEventStore::new());
    let event = create(&store, "evt_slow").await;

    let shutdown = CancellationToken::new();
    let config = WorkerConfig { process_delay: Duration::from_secs(30), ..fast_config(1) };
    let processor = Arc::new(SimulatedProcessor::new(config.process_delay, clock()));
    let mut pool = start_pool(&store, processor, config, &shutdown);
    pool.spawn_workers().await.unwrap();

    wait_for_stats(&pool, |stats| stats.events_claimed == 1).await;

    let started = std::time::Instant::now();
    shutdown.cancel();
    pool.wait().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let stored = store.event(event.id).await.unwrap();
    assert_eq!(stored.status, EventStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("processing interrupted by shutdown"));
}

#[tokio::test]
async fn shutdown_times_out_when_resolution_hangs() {
    let store = Arc::new(MemoryEventStore::new());
    create(&store, "evt_1").await;

    let shutdown = CancellationToken::new();
    let config = WorkerConfig { process_delay: Duration::from_secs(30), ..fast_config(1) };
    let processor = Arc::new(SimulatedProcessor::new(config.process_delay, clock()));
    let hanging: Arc<dyn EventStore> = Arc::new(HangingResolutionStore { inner: store.clone() });
    let mut pool = WorkerPool::new(hanging, processor, config, clock(), &shutdown).unwrap();
    pool.spawn_workers().await.unwrap();
    wait_for_stats(&pool, |stats| stats.events_claimed == 1).await;

    let result = pool.shutdown_graceful(Duration::from_millis(100)).await;

    assert!(matches!(result, Err(WorkerError::ShutdownTimeout { .. })));
}
