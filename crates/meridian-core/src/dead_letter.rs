//! Dead letter records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivery permanently abandoned after exhausting its retry budget.
///
/// `payload` holds the full serialized envelope (not just the event's own
/// payload), so an operator retry can re-deliver the original message even
/// after the source event is no longer queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// The subscription whose delivery was exhausted.
    pub subscription_id: Uuid,
    /// Event ID of the undeliverable event.
    pub original_event_id: Uuid,
    /// Event type of the undeliverable event.
    pub event_type: String,
    /// Full serialized envelope, captured at dead-lettering time.
    pub payload: serde_json::Value,
    /// Message of the final delivery failure.
    pub error_message: String,
    /// Kind of the final delivery failure, if classified.
    pub exception_type: Option<String>,
    /// Delivery attempts made before dead-lettering.
    pub retry_count: i32,
    /// The subscription's retry budget at the time of dead-lettering.
    pub max_retries: i32,
    /// When the entry was written.
    pub dead_lettered_at: DateTime<Utc>,
    /// Whether the failure has been resolved (successful manual retry or
    /// operator acknowledgement).
    pub is_resolved: bool,
    /// Whether an operator retry is waiting to be picked up by the
    /// dispatcher.
    pub retry_requested: bool,
}

/// A dead letter submitted for enqueueing.
#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    /// The subscription whose delivery was exhausted.
    pub subscription_id: Uuid,
    /// Event ID of the undeliverable event.
    pub original_event_id: Uuid,
    /// Event type of the undeliverable event.
    pub event_type: String,
    /// Full serialized envelope.
    pub payload: serde_json::Value,
    /// Message of the final delivery failure.
    pub error_message: String,
    /// Kind of the final delivery failure, if classified.
    pub exception_type: Option<String>,
    /// Delivery attempts made before dead-lettering.
    pub retry_count: i32,
    /// The subscription's retry budget.
    pub max_retries: i32,
}
