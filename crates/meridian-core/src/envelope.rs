//! Event envelope types and append-time validation.
//!
//! The envelope separates reserved fields (identity, ordering, causality,
//! provenance) from the type-specific payload: reserved fields are
//! top-level, the payload is nested, so envelope parsing never collides
//! with payload schema evolution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StoreError;

/// Upper bound on the serialized size of an event's metadata map.
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

/// Schema version assigned when the producer does not supply one.
pub const DEFAULT_PAYLOAD_VERSION: i32 = 1;

/// An event submitted for appending. The store assigns identity,
/// timestamp, hash, and global position on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate (e.g. `Spacecraft`).
    pub aggregate_type: String,
    /// Stable event type name (e.g. `SpacecraftCreated`).
    pub event_type: String,
    /// The sequence number this event is expected to receive: exactly one
    /// past the aggregate's current maximum, or 1 for a new aggregate.
    pub sequence_number: i64,
    /// Type-specific payload, opaque to the store.
    pub payload: serde_json::Value,
    /// Free-form key/value metadata, size-bounded.
    pub metadata: BTreeMap<String, String>,
    /// Correlation ID propagated across causally related events.
    pub correlation_id: Option<Uuid>,
    /// Event ID of the event that triggered this one, if any.
    pub causation_id: Option<Uuid>,
    /// Schema version of the payload.
    pub version: i32,
    /// Identity of the producing service.
    pub source_service: String,
}

impl NewEvent {
    /// Creates a `NewEvent` with empty metadata, no causality links, and
    /// payload version 1.
    #[must_use]
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        sequence_number: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            sequence_number,
            payload,
            metadata: BTreeMap::new(),
            correlation_id: None,
            causation_id: None,
            version: DEFAULT_PAYLOAD_VERSION,
            source_service: "unknown".to_owned(),
        }
    }

    /// Set the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Set the causation ID.
    #[must_use]
    pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Set the producing service identity.
    #[must_use]
    pub fn with_source_service(mut self, source_service: impl Into<String>) -> Self {
        self.source_service = source_service.into();
        self
    }

    /// Set the payload schema version.
    #[must_use]
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validates the structural rules every append must satisfy.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the sequence number is below 1,
    /// a required field is blank, the payload version is below 1, or the
    /// metadata exceeds [`MAX_METADATA_BYTES`] when serialized.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.sequence_number < 1 {
            return Err(StoreError::Validation(
                "sequence number must be at least 1".into(),
            ));
        }
        if self.event_type.trim().is_empty() {
            return Err(StoreError::Validation("event type must not be empty".into()));
        }
        if self.aggregate_type.trim().is_empty() {
            return Err(StoreError::Validation(
                "aggregate type must not be empty".into(),
            ));
        }
        if self.source_service.trim().is_empty() {
            return Err(StoreError::Validation(
                "source service must not be empty".into(),
            ));
        }
        if self.version < 1 {
            return Err(StoreError::Validation(
                "payload version must be at least 1".into(),
            ));
        }
        let metadata_bytes = serde_json::to_vec(&self.metadata)
            .map_err(|e| StoreError::Validation(format!("metadata is not serializable: {e}")))?;
        if metadata_bytes.len() > MAX_METADATA_BYTES {
            return Err(StoreError::Validation(format!(
                "metadata exceeds {MAX_METADATA_BYTES} bytes when serialized"
            )));
        }
        Ok(())
    }
}

/// A stored event: the unit persisted by the log and delivered to
/// subscribers. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique event identifier, assigned by the store.
    pub event_id: Uuid,
    /// Stable event type name.
    pub event_type: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate.
    pub aggregate_type: String,
    /// Position within the aggregate stream, starting at 1, gap-free.
    pub sequence_number: i64,
    /// Position in the global append order across all aggregates.
    pub global_position: i64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
    /// Free-form key/value metadata.
    pub metadata: BTreeMap<String, String>,
    /// Hex SHA-256 over the serialized payload, computed by the store.
    pub payload_hash: String,
    /// Timestamp of event creation, set by the store.
    pub occurred_at: DateTime<Utc>,
    /// Correlation ID propagated across causally related events.
    pub correlation_id: Uuid,
    /// Event ID of the event that triggered this one, if any.
    pub causation_id: Option<Uuid>,
    /// Schema version of the payload.
    pub version: i32,
    /// Identity of the producing service.
    pub source_service: String,
}

impl EventEnvelope {
    /// Recomputes the payload hash and compares it to the stored one.
    #[must_use]
    pub fn verify_payload_hash(&self) -> bool {
        payload_hash(&self.payload) == self.payload_hash
    }
}

/// Hex SHA-256 over the compact JSON serialization of a payload.
#[must_use]
pub fn payload_hash(payload: &serde_json::Value) -> String {
    format!("{:x}", Sha256::digest(payload.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_event() -> NewEvent {
        NewEvent::new(
            Uuid::new_v4(),
            "Spacecraft",
            "SpacecraftCreated",
            1,
            serde_json::json!({"name": "Sentinel-7"}),
        )
    }

    #[test]
    fn test_validate_accepts_well_formed_event() {
        assert!(valid_event().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_sequence_below_one() {
        let mut event = valid_event();
        event.sequence_number = 0;
        match event.validate().unwrap_err() {
            StoreError::Validation(msg) => assert!(msg.contains("sequence number")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_blank_event_type() {
        let mut event = valid_event();
        event.event_type = "  ".to_owned();
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_metadata() {
        let mut event = valid_event();
        event
            .metadata
            .insert("blob".to_owned(), "x".repeat(MAX_METADATA_BYTES + 1));
        match event.validate().unwrap_err() {
            StoreError::Validation(msg) => assert!(msg.contains("metadata")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_hash_is_stable_and_detects_tampering() {
        let payload = serde_json::json!({"name": "Sentinel-7", "orbit": "LEO"});
        let hash = payload_hash(&payload);
        assert_eq!(hash, payload_hash(&payload.clone()));

        let tampered = serde_json::json!({"name": "Sentinel-7", "orbit": "GEO"});
        assert_ne!(hash, payload_hash(&tampered));
    }

    #[test]
    fn test_envelope_wire_shape_keeps_reserved_fields_top_level() {
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: "SpacecraftCreated".to_owned(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: "Spacecraft".to_owned(),
            sequence_number: 1,
            global_position: 7,
            payload: serde_json::json!({"eventId": "payload-level, not envelope-level"}),
            metadata: BTreeMap::new(),
            payload_hash: String::new(),
            occurred_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
            causation_id: None,
            version: 1,
            source_service: "mission-svc".to_owned(),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json["eventId"].is_string());
        assert!(json["globalPosition"].is_i64());
        assert!(json["causationId"].is_null());
        // The payload's own `eventId` stays nested and cannot shadow the
        // envelope's.
        assert_eq!(json["payload"]["eventId"], "payload-level, not envelope-level");
    }
}
