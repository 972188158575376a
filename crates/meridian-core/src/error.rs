//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for all store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict on append.
    ///
    /// `current` is the aggregate's actual maximum sequence number, so the
    /// caller can re-read state and retry with `current + 1`.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: attempted sequence {attempted}, current is {current}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The sequence number the caller attempted to append.
        attempted: i64,
        /// The aggregate's current maximum sequence number.
        current: i64,
    },

    /// A subscription with this name already exists.
    #[error("subscription name already registered: {0}")]
    DuplicateSubscriptionName(String),

    /// No subscription with this id exists.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    /// No dead letter entry with this id exists.
    #[error("dead letter not found: {0}")]
    DeadLetterNotFound(Uuid),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("storage error: {0}")]
    Storage(String),
}
