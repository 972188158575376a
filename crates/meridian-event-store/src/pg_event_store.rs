//! `PostgreSQL` implementation of the `EventStore` trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use meridian_core::clock::{Clock, SystemClock};
use meridian_core::envelope::{EventEnvelope, NewEvent, payload_hash};
use meridian_core::error::StoreError;
use meridian_core::store::EventStore;

use crate::pg::{is_unique_violation, storage_err};

const SEQUENCE_CONSTRAINT: &str = "event_log_aggregate_sequence_key";

const EVENT_COLUMNS: &str = "event_id, event_type, aggregate_id, aggregate_type, \
     sequence_number, global_position, payload, metadata, payload_hash, occurred_at, \
     correlation_id, causation_id, version, source_service";

/// PostgreSQL-backed append-only event log.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgEventStore {
    /// Creates a `PgEventStore` using the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a `PgEventStore` with an injected clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn current_sequence(&self, aggregate_id: Uuid) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM event_log WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    event_type: String,
    aggregate_id: Uuid,
    aggregate_type: String,
    sequence_number: i64,
    global_position: i64,
    payload: serde_json::Value,
    metadata: sqlx::types::Json<BTreeMap<String, String>>,
    payload_hash: String,
    occurred_at: DateTime<Utc>,
    correlation_id: Uuid,
    causation_id: Option<Uuid>,
    version: i32,
    source_service: String,
}

impl From<EventRow> for EventEnvelope {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number,
            global_position: row.global_position,
            payload: row.payload,
            metadata: row.metadata.0,
            payload_hash: row.payload_hash,
            occurred_at: row.occurred_at,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            version: row.version,
            source_service: row.source_service,
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<EventEnvelope, StoreError> {
        event.validate()?;

        let event_id = Uuid::new_v4();
        let occurred_at = self.clock.now();
        // An event without a supplied correlation starts its own chain.
        let correlation_id = event.correlation_id.unwrap_or(event_id);
        let hash = payload_hash(&event.payload);

        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let current: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM event_log WHERE aggregate_id = $1",
        )
        .bind(event.aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err)?;

        if event.sequence_number != current + 1 {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: event.aggregate_id,
                attempted: event.sequence_number,
                current,
            });
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO event_log (event_id, event_type, aggregate_id, aggregate_type, \
             sequence_number, payload, metadata, payload_hash, occurred_at, correlation_id, \
             causation_id, version, source_service) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING global_position",
        )
        .bind(event_id)
        .bind(&event.event_type)
        .bind(event.aggregate_id)
        .bind(&event.aggregate_type)
        .bind(event.sequence_number)
        .bind(&event.payload)
        .bind(sqlx::types::Json(&event.metadata))
        .bind(&hash)
        .bind(occurred_at)
        .bind(correlation_id)
        .bind(event.causation_id)
        .bind(event.version)
        .bind(&event.source_service)
        .fetch_one(&mut *tx)
        .await;

        let global_position = match inserted {
            Ok(position) => position,
            Err(err) if is_unique_violation(&err, SEQUENCE_CONSTRAINT) => {
                // Another writer won the race between the max check and
                // the insert. Report the committed maximum.
                drop(tx);
                let current = self.current_sequence(event.aggregate_id).await?;
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_id: event.aggregate_id,
                    attempted: event.sequence_number,
                    current,
                });
            }
            Err(err) => return Err(storage_err(err)),
        };

        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(
            event_id = %event_id,
            aggregate_id = %event.aggregate_id,
            sequence_number = event.sequence_number,
            global_position,
            "appended event"
        );

        Ok(EventEnvelope {
            event_id,
            event_type: event.event_type,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type,
            sequence_number: event.sequence_number,
            global_position,
            payload: event.payload,
            metadata: event.metadata,
            payload_hash: hash,
            occurred_at,
            correlation_id,
            causation_id: event.causation_id,
            version: event.version,
            source_service: event.source_service,
        })
    }

    async fn read_stream(
        &self,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM event_log \
             WHERE aggregate_id = $1 AND sequence_number >= $2 \
             ORDER BY sequence_number"
        ))
        .bind(aggregate_id)
        .bind(from_sequence)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn read_by_type(
        &self,
        event_type: &str,
        after_position: i64,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM event_log \
             WHERE event_type = $1 AND global_position > $2 \
             ORDER BY global_position LIMIT $3"
        ))
        .bind(event_type)
        .bind(after_position)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn read_matching(
        &self,
        event_types: &[String],
        aggregate_types: &[String],
        after_position: i64,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM event_log \
             WHERE event_type = ANY($1) \
             AND (cardinality($2::text[]) = 0 OR aggregate_type = ANY($2)) \
             AND global_position > $3 \
             ORDER BY global_position LIMIT $4"
        ))
        .bind(event_types)
        .bind(aggregate_types)
        .bind(after_position)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }

    async fn read_by_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM event_log \
             WHERE correlation_id = $1 \
             ORDER BY global_position"
        ))
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(EventEnvelope::from).collect())
    }
}
