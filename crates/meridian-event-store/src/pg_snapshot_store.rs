//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use meridian_core::clock::{Clock, SystemClock};
use meridian_core::error::StoreError;
use meridian_core::snapshot::{NewSnapshot, Snapshot};
use meridian_core::store::SnapshotStore;

use crate::pg::storage_err;

/// PostgreSQL-backed snapshot storage.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgSnapshotStore {
    /// Creates a `PgSnapshotStore` using the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a `PgSnapshotStore` with an injected clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    aggregate_id: Uuid,
    aggregate_type: String,
    sequence_number: i64,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save(&self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError> {
        snapshot.validate()?;
        let created_at = self.clock.now();

        sqlx::query(
            "INSERT INTO snapshots (aggregate_id, aggregate_type, sequence_number, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(snapshot.aggregate_id)
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.sequence_number)
        .bind(&snapshot.payload)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(Snapshot {
            aggregate_id: snapshot.aggregate_id,
            aggregate_type: snapshot.aggregate_type,
            sequence_number: snapshot.sequence_number,
            payload: snapshot.payload,
            created_at,
        })
    }

    async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT aggregate_id, aggregate_type, sequence_number, payload, created_at \
             FROM snapshots WHERE aggregate_id = $1 \
             ORDER BY sequence_number DESC LIMIT 1",
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(Snapshot::from))
    }
}
