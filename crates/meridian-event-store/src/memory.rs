//! In-memory backend for development and standalone tests.
//!
//! One shared state implements all four store traits, so the dead-letter
//! upsert and the subscription cursor advance stay atomic under a single
//! lock. The production event log remains PostgreSQL; this backend exists
//! for development mode and tests.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use meridian_core::clock::{Clock, SystemClock};
use meridian_core::dead_letter::{DeadLetterEntry, NewDeadLetter};
use meridian_core::envelope::{EventEnvelope, NewEvent, payload_hash};
use meridian_core::error::StoreError;
use meridian_core::snapshot::{NewSnapshot, Snapshot};
use meridian_core::store::{DeadLetterStore, EventStore, SnapshotStore, SubscriptionStore};
use meridian_core::subscription::{NewSubscription, Subscription};

#[derive(Default)]
struct MemoryState {
    events: Vec<EventEnvelope>,
    snapshots: Vec<Snapshot>,
    subscriptions: Vec<Subscription>,
    dead_letters: Vec<DeadLetterEntry>,
    next_global: i64,
}

/// In-memory implementation of all four store traits.
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// Creates an empty backend using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty backend with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            clock,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("state lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("state lock poisoned".into()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert_dead_letter(
    state: &mut MemoryState,
    entry: NewDeadLetter,
    dead_lettered_at: DateTime<Utc>,
) -> DeadLetterEntry {
    let existing = state.dead_letters.iter_mut().find(|d| {
        d.subscription_id == entry.subscription_id && d.original_event_id == entry.original_event_id
    });

    if let Some(existing) = existing {
        existing.event_type = entry.event_type;
        existing.payload = entry.payload;
        existing.error_message = entry.error_message;
        existing.exception_type = entry.exception_type;
        existing.retry_count = entry.retry_count;
        existing.max_retries = entry.max_retries;
        existing.dead_lettered_at = dead_lettered_at;
        existing.is_resolved = false;
        existing.retry_requested = false;
        return existing.clone();
    }

    let stored = DeadLetterEntry {
        id: Uuid::new_v4(),
        subscription_id: entry.subscription_id,
        original_event_id: entry.original_event_id,
        event_type: entry.event_type,
        payload: entry.payload,
        error_message: entry.error_message,
        exception_type: entry.exception_type,
        retry_count: entry.retry_count,
        max_retries: entry.max_retries,
        dead_lettered_at,
        is_resolved: false,
        retry_requested: false,
    };
    state.dead_letters.push(stored.clone());
    stored
}

#[async_trait]
impl EventStore for MemoryBackend {
    async fn append(&self, event: NewEvent) -> Result<EventEnvelope, StoreError> {
        event.validate()?;

        let occurred_at = self.clock.now();
        let mut state = self.write()?;

        let current = state
            .events
            .iter()
            .filter(|e| e.aggregate_id == event.aggregate_id)
            .map(|e| e.sequence_number)
            .max()
            .unwrap_or(0);

        if event.sequence_number != current + 1 {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: event.aggregate_id,
                attempted: event.sequence_number,
                current,
            });
        }

        state.next_global += 1;
        let event_id = Uuid::new_v4();
        let envelope = EventEnvelope {
            event_id,
            event_type: event.event_type,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type,
            sequence_number: event.sequence_number,
            global_position: state.next_global,
            payload_hash: payload_hash(&event.payload),
            payload: event.payload,
            metadata: event.metadata,
            occurred_at,
            correlation_id: event.correlation_id.unwrap_or(event_id),
            causation_id: event.causation_id,
            version: event.version,
            source_service: event.source_service,
        };
        state.events.push(envelope.clone());
        Ok(envelope)
    }

    async fn read_stream(
        &self,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.sequence_number >= from_sequence)
            .cloned()
            .collect())
    }

    async fn read_by_type(
        &self,
        event_type: &str,
        after_position: i64,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.event_type == event_type && e.global_position > after_position)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn read_matching(
        &self,
        event_types: &[String],
        aggregate_types: &[String],
        after_position: i64,
        limit: i64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|e| {
                e.global_position > after_position
                    && event_types.contains(&e.event_type)
                    && (aggregate_types.is_empty() || aggregate_types.contains(&e.aggregate_type))
            })
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn read_by_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let state = self.read()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SnapshotStore for MemoryBackend {
    async fn save(&self, snapshot: NewSnapshot) -> Result<Snapshot, StoreError> {
        snapshot.validate()?;
        let stored = Snapshot {
            aggregate_id: snapshot.aggregate_id,
            aggregate_type: snapshot.aggregate_type,
            sequence_number: snapshot.sequence_number,
            payload: snapshot.payload,
            created_at: self.clock.now(),
        };
        self.write()?.snapshots.push(stored.clone());
        Ok(stored)
    }

    async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        let state = self.read()?;
        Ok(state
            .snapshots
            .iter()
            .filter(|s| s.aggregate_id == aggregate_id)
            .max_by_key(|s| s.sequence_number)
            .cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryBackend {
    async fn register(&self, subscription: NewSubscription) -> Result<Subscription, StoreError> {
        subscription.validate()?;
        let created_at = self.clock.now();
        let mut state = self.write()?;

        if state.subscriptions.iter().any(|s| s.name == subscription.name) {
            return Err(StoreError::DuplicateSubscriptionName(subscription.name));
        }

        let stored = Subscription {
            id: Uuid::new_v4(),
            name: subscription.name,
            event_types: subscription.event_types,
            aggregate_types: subscription.aggregate_types,
            callback_url: subscription.callback_url,
            is_active: true,
            max_retries: subscription.max_retries,
            next_retry_at: None,
            position: 0,
            created_at,
        };
        state.subscriptions.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Subscription, StoreError> {
        self.read()?
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::SubscriptionNotFound(id))
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.read()?.subscriptions.clone())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .read()?
            .subscriptions
            .iter()
            .filter(|s| s.is_active && s.next_retry_at.is_none_or(|at| at <= now))
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Subscription, StoreError> {
        let mut state = self.write()?;
        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        subscription.is_active = active;
        Ok(subscription.clone())
    }

    async fn update_retry_state(
        &self,
        id: Uuid,
        next_retry_at: Option<DateTime<Utc>>,
        position: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::SubscriptionNotFound(id))?;
        subscription.next_retry_at = next_retry_at;
        subscription.position = position;
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for MemoryBackend {
    async fn enqueue(&self, entry: NewDeadLetter) -> Result<DeadLetterEntry, StoreError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        Ok(upsert_dead_letter(&mut state, entry, now))
    }

    async fn enqueue_and_advance(
        &self,
        entry: NewDeadLetter,
        position: i64,
    ) -> Result<DeadLetterEntry, StoreError> {
        let now = self.clock.now();
        let subscription_id = entry.subscription_id;
        let mut state = self.write()?;

        let stored = upsert_dead_letter(&mut state, entry, now);

        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
            .ok_or(StoreError::SubscriptionNotFound(subscription_id))?;
        subscription.position = position;
        subscription.next_retry_at = None;

        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<DeadLetterEntry, StoreError> {
        self.read()?
            .dead_letters
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(StoreError::DeadLetterNotFound(id))
    }

    async fn list(
        &self,
        subscription_id: Option<Uuid>,
        resolved: Option<bool>,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let state = self.read()?;
        let mut entries: Vec<DeadLetterEntry> = state
            .dead_letters
            .iter()
            .filter(|d| subscription_id.is_none_or(|id| d.subscription_id == id))
            .filter(|d| resolved.is_none_or(|r| d.is_resolved == r))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.dead_lettered_at.cmp(&a.dead_lettered_at));
        Ok(entries)
    }

    async fn request_retry(&self, id: Uuid) -> Result<DeadLetterEntry, StoreError> {
        let mut state = self.write()?;
        let entry = state
            .dead_letters
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::DeadLetterNotFound(id))?;
        entry.retry_requested = true;
        entry.retry_count = 0;
        Ok(entry.clone())
    }

    async fn take_retry_requests(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let mut state = self.write()?;
        let mut taken = Vec::new();
        for entry in &mut state.dead_letters {
            if entry.subscription_id == subscription_id && entry.retry_requested {
                entry.retry_requested = false;
                taken.push(entry.clone());
            }
        }
        Ok(taken)
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let entry = state
            .dead_letters
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::DeadLetterNotFound(id))?;
        entry.is_resolved = true;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let before = state.dead_letters.len();
        state.dead_letters.retain(|d| d.id != id);
        if state.dead_letters.len() == before {
            return Err(StoreError::DeadLetterNotFound(id));
        }
        Ok(())
    }
}
