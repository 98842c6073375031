//! Repository for webhook event database operations.
//!
//! Implements the claim/resolve protocol on PostgreSQL. Claiming relies on
//! `FOR UPDATE SKIP LOCKED` so competing workers never receive the same row,
//! and resolutions are guarded on `status = 'processing'` so a terminal event
//! can never be resolved twice.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{EventId, EventStatus, NewWebhookEvent, WebhookEvent},
};

const EVENT_COLUMNS: &str =
    "id, event_id, type, payload, status, last_error, created_at, updated_at";

/// Repository for webhook event database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Persists a new event in `pending`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConstraintViolation` if a unique index on
    /// `event_id` exists and rejects the row, `CoreError::Database` otherwise.
    pub async fn create(&self, new_event: NewWebhookEvent) -> Result<WebhookEvent> {
        let event = WebhookEvent::pending(new_event, Utc::now());

        let stored = sqlx::query_as::<_, WebhookEvent>(&format!(
            r#"
            INSERT INTO webhook_events (
                id, event_id, type, payload, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id)
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(EventStatus::Pending)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(stored)
    }

    /// Claims the oldest pending event and moves it to `processing`.
    ///
    /// Select and update happen in one statement. Rows locked by another
    /// claimer are skipped rather than waited on, so ordering is oldest-first
    /// but not strictly FIFO under contention.
    ///
    /// Returns `Ok(None)` when the backlog is empty.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn claim_next(&self) -> Result<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(&format!(
            r#"
            UPDATE webhook_events
            SET status = 'processing', updated_at = NOW()
            WHERE id = (
                SELECT id FROM webhook_events
                WHERE status = 'pending'
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Resolves a claimed event as `done`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the event does not exist or is not
    /// currently `processing`.
    pub async fn mark_done(&self, id: EventId) -> Result<WebhookEvent> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            r#"
            UPDATE webhook_events
            SET status = 'done', last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| not_processing(id))
    }

    /// Resolves a claimed event as `failed`, recording `error_message`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the event does not exist or is not
    /// currently `processing`.
    pub async fn mark_failed(&self, id: EventId, error_message: &str) -> Result<WebhookEvent> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            r#"
            UPDATE webhook_events
            SET status = 'failed', last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error_message)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| not_processing(id))
    }

    /// Finds an event by ID.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, id: EventId) -> Result<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }
}

fn not_processing(id: EventId) -> CoreError {
    CoreError::NotFound(format!("event {id} is not in processing"))
}
