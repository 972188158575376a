//! Subscription records and filter matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::EventEnvelope;
use crate::error::StoreError;

/// Retry budget assigned when a registration does not supply one.
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// A registered webhook consumer and the delivery cursor the dispatcher
/// maintains for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Unique subscription identifier.
    pub id: Uuid,
    /// Unique human-assigned name.
    pub name: String,
    /// Event types this subscription fires for. Never empty.
    pub event_types: Vec<String>,
    /// Aggregate types this subscription fires for. Empty means all.
    pub aggregate_types: Vec<String>,
    /// Webhook URL events are POSTed to.
    pub callback_url: String,
    /// Whether the subscription is eligible for dispatch.
    pub is_active: bool,
    /// Retry budget per event before dead-lettering.
    pub max_retries: i32,
    /// When set, the dispatcher must not attempt delivery before this
    /// instant.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Global position of the last event resolved to delivered or
    /// dead-lettered. The dispatcher never advances this past an
    /// unresolved event.
    pub position: i64,
    /// Timestamp the subscription was registered.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Returns whether an event passes this subscription's filters.
    #[must_use]
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        self.event_types.iter().any(|t| *t == event.event_type)
            && (self.aggregate_types.is_empty()
                || self.aggregate_types.iter().any(|t| *t == event.aggregate_type))
    }
}

/// A registration request for a new subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    /// Unique human-assigned name.
    pub name: String,
    /// Event types to fire for. Must be non-empty.
    pub event_types: Vec<String>,
    /// Aggregate types to fire for. Empty means all.
    pub aggregate_types: Vec<String>,
    /// Webhook URL events are POSTed to.
    pub callback_url: String,
    /// Retry budget per event before dead-lettering.
    pub max_retries: i32,
}

impl NewSubscription {
    /// Creates a registration with no aggregate-type filter and the
    /// default retry budget.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        event_types: Vec<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            event_types,
            aggregate_types: Vec::new(),
            callback_url: callback_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Restrict the subscription to the given aggregate types.
    #[must_use]
    pub fn with_aggregate_types(mut self, aggregate_types: Vec<String>) -> Self {
        self.aggregate_types = aggregate_types;
        self
    }

    /// Set the per-event retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the name is blank, the event
    /// type set is empty or contains a blank entry, the callback URL is
    /// not http/https, or the retry budget is below 1.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation(
                "subscription name must not be empty".into(),
            ));
        }
        if self.event_types.is_empty() {
            return Err(StoreError::Validation(
                "subscription must filter on at least one event type".into(),
            ));
        }
        if self.event_types.iter().any(|t| t.trim().is_empty()) {
            return Err(StoreError::Validation(
                "event type filters must not be empty".into(),
            ));
        }
        if !self.callback_url.starts_with("http://") && !self.callback_url.starts_with("https://") {
            return Err(StoreError::Validation(
                "callback URL must be an http or https URL".into(),
            ));
        }
        if self.max_retries < 1 {
            return Err(StoreError::Validation(
                "max retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
