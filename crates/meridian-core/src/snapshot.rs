//! Snapshot records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// A compacted aggregate state at a given sequence number, written by
/// aggregate owners to shorten replay. Never mutated; the highest
/// `sequence_number` per aggregate is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Aggregate this snapshot belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate.
    pub aggregate_type: String,
    /// The last event sequence number folded into this snapshot.
    pub sequence_number: i64,
    /// Serialized aggregate state.
    pub payload: serde_json::Value,
    /// Timestamp the snapshot was stored.
    pub created_at: DateTime<Utc>,
}

/// A snapshot submitted for saving.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSnapshot {
    /// Aggregate this snapshot belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate.
    pub aggregate_type: String,
    /// The last event sequence number folded into this snapshot.
    pub sequence_number: i64,
    /// Serialized aggregate state.
    pub payload: serde_json::Value,
}

impl NewSnapshot {
    /// Validates the snapshot record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the sequence number is below 1
    /// or the aggregate type is blank.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.sequence_number < 1 {
            return Err(StoreError::Validation(
                "snapshot sequence number must be at least 1".into(),
            ));
        }
        if self.aggregate_type.trim().is_empty() {
            return Err(StoreError::Validation(
                "aggregate type must not be empty".into(),
            ));
        }
        Ok(())
    }
}
