//! Durable tier for processed-event records.
//!
//! The durable store is the tie-breaker of record once a fast-tier entry
//! has expired or the process has restarted. It only needs two operations:
//! get by id, and insert ignoring a duplicate key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::postgres::PgPool;
use sqlx::Row;
use thiserror::Error;

/// A processed event as remembered by the durable tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum DurableStoreError {
    #[error("database error: {0}")]
    Database(String),
}

fn map_sqlx_err(err: sqlx::Error) -> DurableStoreError {
    DurableStoreError::Database(err.to_string())
}

/// Storage contract for the durable tier. Implementations are assumed to
/// serialize conflicting writes themselves (ACID store or equivalent).
#[async_trait]
pub trait DurableEventStore: Send + Sync {
    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, DurableStoreError>;

    /// Record a processed event; a duplicate `event_id` is silently
    /// ignored, making the write idempotent.
    async fn record(
        &self,
        event_id: &str,
        event_type: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DurableStoreError>;
}

/// Postgres-backed durable tier.
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), DurableStoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS processed_events (
                 event_id     TEXT PRIMARY KEY,
                 event_type   TEXT NOT NULL,
                 processed_at TIMESTAMPTZ NOT NULL
               )"#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl DurableEventStore for PgEventStore {
    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, DurableStoreError> {
        let row = sqlx::query(
            "SELECT event_id, event_type, processed_at FROM processed_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(|row| ProcessedEvent {
            event_id: row.get("event_id"),
            event_type: row.get("event_type"),
            processed_at: row.get("processed_at"),
        }))
    }

    async fn record(
        &self,
        event_id: &str,
        event_type: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DurableStoreError> {
        sqlx::query(
            r#"INSERT INTO processed_events (event_id, event_type, processed_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (event_id) DO NOTHING"#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(processed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

/// In-memory durable tier for tests and single-process setups.
#[derive(Default)]
pub struct MemoryEventStore {
    events: DashMap<String, ProcessedEvent>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl DurableEventStore for MemoryEventStore {
    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, DurableStoreError> {
        Ok(self.events.get(event_id).map(|e| e.clone()))
    }

    async fn record(
        &self,
        event_id: &str,
        event_type: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DurableStoreError> {
        // First write wins; duplicates are ignored, as with ON CONFLICT.
        self.events.entry(event_id.to_string()).or_insert_with(|| ProcessedEvent {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            processed_at,
        });
        Ok(())
    }
}
