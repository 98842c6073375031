//! Property-based tests for the claim protocol.
//!
//! For random backlog sizes and claimer counts, every event is claimed by
//! exactly one claimer and resolution outcomes land where they should.

use std::{collections::HashSet, sync::Arc};

use paywire_core::models::{EventStatus, NewWebhookEvent};
use paywire_worker::{memory::MemoryEventStore, EventStore};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

fn proptest_config() -> ProptestConfig {
    ProptestConfig { cases: 32, failure_persistence: None, ..ProptestConfig::default() }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn every_event_claimed_exactly_once(events in 0usize..120, claimers in 1usize..12) {
        let (claimed, total_processing) = runtime().block_on(async move {
            let store = Arc::new(MemoryEventStore::new());
            for i in 0..events {
                store
                    .create(NewWebhookEvent::new(format!("evt_{i}"), "payment.pending", Vec::new()))
                    .await
                    .unwrap();
            }

            let handles: Vec<_> = (0..claimers)
                .map(|_| {
                    let store: Arc<dyn EventStore> = store.clone();
                    tokio::spawn(async move {
                        let mut ids = Vec::new();
                        while let Some(event) = store.claim_next().await.unwrap() {
                            ids.push(event.id);
                        }
                        ids
                    })
                })
                .collect();

            let mut claimed = Vec::new();
            for handle in handles {
                claimed.extend(handle.await.unwrap());
            }
            (claimed, store.count_by_status(EventStatus::Processing).await)
        });

        let unique: HashSet<_> = claimed.iter().collect();
        prop_assert_eq!(unique.len(), claimed.len());
        prop_assert_eq!(claimed.len(), events);
        prop_assert_eq!(total_processing, events);
    }

    #[test]
    fn resolutions_match_outcomes(outcomes in prop::collection::vec(any::<bool>(), 1..50)) {
        let expected_done = outcomes.iter().filter(|ok| **ok).count();
        let expected_failed = outcomes.len() - expected_done;

        let (done, failed, errors_recorded) = runtime().block_on(async move {
            let store = MemoryEventStore::new();
            for i in 0..outcomes.len() {
                store
                    .create(NewWebhookEvent::new(format!("evt_{i}"), "payment.failed", Vec::new()))
                    .await
                    .unwrap();
            }

            let mut errors_recorded = true;
            for ok in outcomes {
                let event = store.claim_next().await.unwrap().unwrap();
                if ok {
                    store.mark_done(event.id).await.unwrap();
                } else {
                    let failed = store.mark_failed(event.id, format!("failed {}", event.event_id)).await.unwrap();
                    errors_recorded &= failed.last_error == Some(format!("failed {}", event.event_id));
                }
            }

            (
                store.count_by_status(EventStatus::Done).await,
                store.count_by_status(EventStatus::Failed).await,
                errors_recorded,
            )
        });

        prop_assert_eq!(done, expected_done);
        prop_assert_eq!(failed, expected_failed);
        prop_assert!(errors_recorded);
    }
}
