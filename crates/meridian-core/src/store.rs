//! Store traits implemented by the persistence backends.
//!
//! Ownership follows the write paths: the event log is append-only and
//! owned by producers; the dispatcher owns subscription retry state and
//! dead-letter creation and never mutates events or snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dead_letter::{DeadLetterEntry, NewDeadLetter};
use crate::envelope::{EventEnvelope, NewEvent};
use crate::error::StoreError;
use crate::snapshot::{NewSnapshot, Snapshot};
use crate::subscription::{NewSubscription, Subscription};

/// The append-only per-aggregate event log. The source of truth.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically appends one event, enforcing that its sequence number
    /// is exactly one past the aggregate's current maximum.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrencyConflict` (carrying the actual
    /// current maximum) on a sequence mismatch, `StoreError::Validation`
    /// on a malformed event, or `StoreError::Storage` on infrastructure
    /// failure.
    async fn append(&self, event: NewEvent) -> Result<EventEnvelope, StoreError>;

    /// Reads one aggregate's events from `from_sequence` (inclusive) in
    /// ascending sequence order. Restartable from any sequence.
    async fn read_stream(
        &self,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError>;

    /// Reads events of one type across aggregates, in ascending global
    /// position, strictly after `after_position`.
    async fn read_by_type(
        &self,
        event_type: &str,
        after_position: i64,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError>;

    /// The dispatcher's scan: events matching any of `event_types` (and,
    /// when non-empty, any of `aggregate_types`), in ascending global
    /// position, strictly after `after_position`.
    async fn read_matching(
        &self,
        event_types: &[String],
        aggregate_types: &[String],
        after_position: i64,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError>;

    /// Reads all events sharing a correlation ID, in ascending global
    /// position. Audit path, not in the delivery hot path.
    async fn read_by_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<EventEnvelope>, StoreError>;
}

/// Append-only snapshot storage.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Appends a snapshot record. Never overwrites.
    async fn save(&self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError>;

    /// Returns the snapshot with the highest sequence number for the
    /// aggregate, or `None` if no snapshot exists.
    async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError>;
}

/// Durable registry of webhook consumers.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Creates an active subscription.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateSubscriptionName` if the name is
    /// taken, or `StoreError::Validation` on a malformed registration.
    async fn register(&self, subscription: NewSubscription) -> Result<Subscription, StoreError>;

    /// Fetches one subscription.
    async fn get(&self, id: Uuid) -> Result<Subscription, StoreError>;

    /// All subscriptions, active or not.
    async fn list(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Subscriptions eligible for dispatch at `now`: active, and either
    /// no retry hold or one that has elapsed.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, StoreError>;

    /// Flips `is_active` without deleting history.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<Subscription, StoreError>;

    /// Writes the dispatcher's retry cursor: the retry hold and the
    /// consumed position. The only mutation path the dispatcher uses.
    async fn update_retry_state(
        &self,
        id: Uuid,
        next_retry_at: Option<DateTime<Utc>>,
        position: i64,
    ) -> Result<(), StoreError>;
}

/// Durable record of deliveries that exhausted their retry budget.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persists a dead letter. Idempotent per
    /// `(subscription_id, original_event_id)`: re-dead-lettering the same
    /// pair updates the existing entry instead of duplicating it.
    async fn enqueue(&self, entry: NewDeadLetter) -> Result<DeadLetterEntry, StoreError>;

    /// Same upsert as [`enqueue`](DeadLetterStore::enqueue), plus the
    /// owning subscription's cursor advance to `position` and retry-hold
    /// clear, as one atomic mutation.
    async fn enqueue_and_advance(
        &self,
        entry: NewDeadLetter,
        position: i64,
    ) -> Result<DeadLetterEntry, StoreError>;

    /// Fetches one entry.
    async fn get(&self, id: Uuid) -> Result<DeadLetterEntry, StoreError>;

    /// Lists entries, optionally filtered by subscription and resolution
    /// state, newest first.
    async fn list(
        &self,
        subscription_id: Option<Uuid>,
        resolved: Option<bool>,
    ) -> Result<Vec<DeadLetterEntry>, StoreError>;

    /// Flags an entry for redelivery and resets its retry count. The
    /// entry is marked resolved only after a subsequent successful
    /// delivery, not here.
    async fn request_retry(&self, id: Uuid) -> Result<DeadLetterEntry, StoreError>;

    /// Returns the entries flagged for redelivery for one subscription
    /// and clears their flags. The dispatcher's pickup path.
    async fn take_retry_requests(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<DeadLetterEntry>, StoreError>;

    /// Marks an entry resolved.
    async fn mark_resolved(&self, id: Uuid) -> Result<(), StoreError>;

    /// Deletes an entry without retrying.
    async fn remove(&self, id: Uuid) -> Result<(), StoreError>;
}
