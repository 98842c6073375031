//! PostgreSQL persistence for webhook events.
//!
//! All SQL touching `webhook_events` lives in this module. Schema creation is
//! idempotent so every process may run it at startup.

use std::sync::Arc;

use sqlx::PgPool;

pub mod webhook_events;

use crate::error::Result;

/// Entry point for database operations, sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook event operations.
    pub webhook_events: Arc<webhook_events::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { webhook_events: Arc::new(webhook_events::Repository::new(Arc::new(pool))) }
    }

    /// The shared connection pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.webhook_events.pool()
    }

    /// Verifies database connectivity with `SELECT 1`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.webhook_events.pool()).await?;

        Ok(())
    }

    /// Creates the `webhook_events` table and its claim index if missing.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if a DDL statement fails.
    pub async fn run_migrations(&self) -> Result<()> {
        let pool = self.webhook_events.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhook_events (
                id UUID PRIMARY KEY,
                event_id TEXT NOT NULL,
                type TEXT NOT NULL,
                payload BYTEA NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'processing', 'done', 'failed')),
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*pool)
        .await?;

        // Claim scans only touch pending rows.
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_webhook_events_pending
            ON webhook_events(created_at)
            WHERE status = 'pending'
            "#,
        )
        .execute(&*pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_webhook_events_event_id
            ON webhook_events(event_id)
            "#,
        )
        .execute(&*pool)
        .await?;

        tracing::debug!("webhook_events schema ensured");
        Ok(())
    }
}
