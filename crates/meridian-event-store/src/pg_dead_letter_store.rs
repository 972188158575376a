//! `PostgreSQL` implementation of the `DeadLetterStore` trait.
//!
//! `enqueue_and_advance` wraps the dead-letter upsert and the owning
//! subscription's cursor advance in one transaction, so the dispatcher
//! never observes one without the other.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use meridian_core::clock::{Clock, SystemClock};
use meridian_core::dead_letter::{DeadLetterEntry, NewDeadLetter};
use meridian_core::error::StoreError;
use meridian_core::store::DeadLetterStore;

use crate::pg::storage_err;

const DEAD_LETTER_COLUMNS: &str = "id, subscription_id, original_event_id, event_type, payload, \
     error_message, exception_type, retry_count, max_retries, dead_lettered_at, is_resolved, \
     retry_requested";

const UPSERT_SQL: &str = "INSERT INTO dead_letters (id, subscription_id, original_event_id, \
     event_type, payload, error_message, exception_type, retry_count, max_retries, \
     dead_lettered_at, is_resolved, retry_requested) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, FALSE) \
     ON CONFLICT ON CONSTRAINT dead_letters_subscription_event_key DO UPDATE SET \
     event_type = EXCLUDED.event_type, \
     payload = EXCLUDED.payload, \
     error_message = EXCLUDED.error_message, \
     exception_type = EXCLUDED.exception_type, \
     retry_count = EXCLUDED.retry_count, \
     max_retries = EXCLUDED.max_retries, \
     dead_lettered_at = EXCLUDED.dead_lettered_at, \
     is_resolved = FALSE, \
     retry_requested = FALSE \
     RETURNING id, subscription_id, original_event_id, event_type, payload, error_message, \
     exception_type, retry_count, max_retries, dead_lettered_at, is_resolved, retry_requested";

/// PostgreSQL-backed dead letter storage.
#[derive(Clone)]
pub struct PgDeadLetterStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgDeadLetterStore {
    /// Creates a `PgDeadLetterStore` using the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a `PgDeadLetterStore` with an injected clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    id: Uuid,
    subscription_id: Uuid,
    original_event_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    error_message: String,
    exception_type: Option<String>,
    retry_count: i32,
    max_retries: i32,
    dead_lettered_at: DateTime<Utc>,
    is_resolved: bool,
    retry_requested: bool,
}

impl From<DeadLetterRow> for DeadLetterEntry {
    fn from(row: DeadLetterRow) -> Self {
        Self {
            id: row.id,
            subscription_id: row.subscription_id,
            original_event_id: row.original_event_id,
            event_type: row.event_type,
            payload: row.payload,
            error_message: row.error_message,
            exception_type: row.exception_type,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            dead_lettered_at: row.dead_lettered_at,
            is_resolved: row.is_resolved,
            retry_requested: row.retry_requested,
        }
    }
}

fn bind_upsert<'q>(
    entry: &'q NewDeadLetter,
    id: Uuid,
    dead_lettered_at: DateTime<Utc>,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, DeadLetterRow, sqlx::postgres::PgArguments> {
    sqlx::query_as(UPSERT_SQL)
        .bind(id)
        .bind(entry.subscription_id)
        .bind(entry.original_event_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(&entry.error_message)
        .bind(entry.exception_type.as_deref())
        .bind(entry.retry_count)
        .bind(entry.max_retries)
        .bind(dead_lettered_at)
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn enqueue(&self, entry: NewDeadLetter) -> Result<DeadLetterEntry, StoreError> {
        let row: DeadLetterRow = bind_upsert(&entry, Uuid::new_v4(), self.clock.now())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.into())
    }

    async fn enqueue_and_advance(
        &self,
        entry: NewDeadLetter,
        position: i64,
    ) -> Result<DeadLetterEntry, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row: DeadLetterRow = bind_upsert(&entry, Uuid::new_v4(), self.clock.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_err)?;

        sqlx::query("UPDATE subscriptions SET position = $2, next_retry_at = NULL WHERE id = $1")
            .bind(entry.subscription_id)
            .bind(position)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        tracing::warn!(
            subscription_id = %entry.subscription_id,
            event_id = %entry.original_event_id,
            retry_count = entry.retry_count,
            "dead-lettered delivery"
        );

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<DeadLetterEntry, StoreError> {
        let row: Option<DeadLetterRow> = sqlx::query_as(&format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(DeadLetterEntry::from)
            .ok_or(StoreError::DeadLetterNotFound(id))
    }

    async fn list(
        &self,
        subscription_id: Option<Uuid>,
        resolved: Option<bool>,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(&format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters \
             WHERE ($1::uuid IS NULL OR subscription_id = $1) \
             AND ($2::boolean IS NULL OR is_resolved = $2) \
             ORDER BY dead_lettered_at DESC"
        ))
        .bind(subscription_id)
        .bind(resolved)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(DeadLetterEntry::from).collect())
    }

    async fn request_retry(&self, id: Uuid) -> Result<DeadLetterEntry, StoreError> {
        let row: Option<DeadLetterRow> = sqlx::query_as(&format!(
            "UPDATE dead_letters SET retry_requested = TRUE, retry_count = 0 WHERE id = $1 \
             RETURNING {DEAD_LETTER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(DeadLetterEntry::from)
            .ok_or(StoreError::DeadLetterNotFound(id))
    }

    async fn take_retry_requests(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(&format!(
            "UPDATE dead_letters SET retry_requested = FALSE \
             WHERE subscription_id = $1 AND retry_requested \
             RETURNING {DEAD_LETTER_COLUMNS}"
        ))
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(DeadLetterEntry::from).collect())
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE dead_letters SET is_resolved = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DeadLetterNotFound(id));
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM dead_letters WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DeadLetterNotFound(id));
        }
        Ok(())
    }
}
