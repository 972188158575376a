//! Shared application state.

use std::sync::Arc;

use meridian_core::registry::PayloadRegistry;
use meridian_core::store::{DeadLetterStore, EventStore, SnapshotStore, SubscriptionStore};

/// Application state shared across all request handlers. The four stores
/// and the payload registry are wired explicitly at startup.
#[derive(Clone)]
pub struct AppState {
    /// The append-only event log.
    pub events: Arc<dyn EventStore>,
    /// Snapshot storage.
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Subscription registry.
    pub subscriptions: Arc<dyn SubscriptionStore>,
    /// Dead letter storage.
    pub dead_letters: Arc<dyn DeadLetterStore>,
    /// Payload schemas validated at append time.
    pub registry: Arc<PayloadRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        registry: Arc<PayloadRegistry>,
    ) -> Self {
        Self {
            events,
            snapshots,
            subscriptions,
            dead_letters,
            registry,
        }
    }
}
