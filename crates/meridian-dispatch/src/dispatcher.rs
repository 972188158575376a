//! The delivery state machine.
//!
//! Long-lived workers each own a disjoint partition of subscriptions
//! (by subscription-id hash), so a subscription's cursor has exactly one
//! writer. Within a worker, subscriptions are processed concurrently
//! under a semaphore; within a subscription, events are delivered in
//! global-position order with head-of-line semantics: a failing event
//! holds back later events for that subscription only.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use meridian_core::clock::Clock;
use meridian_core::dead_letter::{DeadLetterEntry, NewDeadLetter};
use meridian_core::envelope::EventEnvelope;
use meridian_core::error::StoreError;
use meridian_core::jitter::Jitter;
use meridian_core::store::{DeadLetterStore, EventStore, SubscriptionStore};
use meridian_core::subscription::Subscription;

use crate::backoff::BackoffPolicy;
use crate::transport::{DeliveryFailure, DeliveryTransport};

/// Tuning knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks. Subscriptions are partitioned across them.
    pub worker_count: usize,
    /// How long an idle worker sleeps between passes.
    pub poll_interval: Duration,
    /// Maximum events fetched per subscription per scan.
    pub batch_size: i64,
    /// Maximum subscriptions a worker processes concurrently.
    pub max_concurrent_subscriptions: usize,
    /// Retry delay policy.
    pub backoff: BackoffPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_concurrent_subscriptions: 8,
            backoff: BackoffPolicy::default(),
        }
    }
}

struct DispatcherInner {
    events: Arc<dyn EventStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    transport: Arc<dyn DeliveryTransport>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn Jitter>,
    config: DispatcherConfig,
    /// Attempt counters for events not yet resolved. Keyed by
    /// (subscription, event); dropped on delivery or dead-lettering.
    attempts: std::sync::Mutex<HashMap<(Uuid, Uuid), i32>>,
    is_running: AtomicBool,
    notify: Notify,
}

impl DispatcherInner {
    fn bump_attempts(&self, subscription_id: Uuid, event_id: Uuid) -> i32 {
        let mut map = match self.attempts.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = map.entry((subscription_id, event_id)).or_insert(0);
        *count += 1;
        *count
    }

    fn clear_attempts(&self, subscription_id: Uuid, event_id: Uuid) {
        let mut map = match self.attempts.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(&(subscription_id, event_id));
    }

    fn retry_hold(&self, attempts: i32) -> chrono::DateTime<chrono::Utc> {
        let attempt = u32::try_from(attempts).unwrap_or(u32::MAX);
        let delay = self.config.backoff.delay_for_attempt(attempt, self.jitter.as_ref());
        self.clock.now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60))
    }
}

/// The background delivery process. Started once at service startup and
/// shut down gracefully: in-flight attempts finish or time out before
/// workers release.
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the worker tasks and returns the running dispatcher.
    #[must_use]
    pub fn start(
        events: Arc<dyn EventStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        transport: Arc<dyn DeliveryTransport>,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn Jitter>,
        config: DispatcherConfig,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let inner = Arc::new(DispatcherInner {
            events,
            subscriptions,
            dead_letters,
            transport,
            clock,
            jitter,
            config,
            attempts: std::sync::Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
            notify: Notify::new(),
        });

        let worker_handles = (0..worker_count)
            .map(|worker_index| {
                let inner = inner.clone();
                tokio::spawn(worker_loop(inner, worker_index))
            })
            .collect();

        tracing::info!(
            workers = worker_count,
            transport = inner.transport.name(),
            "dispatcher started"
        );

        Self {
            inner,
            worker_handles,
        }
    }

    /// Name of the active transport (`"http"`, `"noop"`, ...).
    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    /// Whether the dispatcher is accepting new passes.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    /// Stops accepting new delivery passes and waits for the workers to
    /// finish their current ones.
    pub async fn shutdown(mut self) {
        self.inner.is_running.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("dispatcher stopped");
    }
}

#[allow(clippy::cast_possible_truncation)]
fn partition_for(subscription_id: Uuid, worker_count: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    subscription_id.hash(&mut hasher);
    (hasher.finish() as usize) % worker_count.max(1)
}

async fn worker_loop(inner: Arc<DispatcherInner>, worker_index: usize) {
    loop {
        if !inner.is_running.load(Ordering::SeqCst) {
            break;
        }

        if let Err(err) = run_pass(&inner, worker_index).await {
            tracing::error!(worker = worker_index, error = %err, "dispatch pass failed");
        }

        if !inner.is_running.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            () = inner.notify.notified() => {}
            () = tokio::time::sleep(inner.config.poll_interval) => {}
        }
    }
}

/// One pass of one worker: process every due subscription in this
/// worker's partition, concurrently up to the configured limit.
async fn run_pass(inner: &Arc<DispatcherInner>, worker_index: usize) -> Result<(), StoreError> {
    let now = inner.clock.now();
    let due = inner.subscriptions.list_due(now).await?;

    let worker_count = inner.config.worker_count.max(1);
    let semaphore = Arc::new(Semaphore::new(
        inner.config.max_concurrent_subscriptions.max(1),
    ));
    let mut join_set = JoinSet::new();

    for subscription in due {
        if partition_for(subscription.id, worker_count) != worker_index {
            continue;
        }
        let inner = inner.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            if let Err(err) = process_subscription(&inner, &subscription).await {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "subscription pass failed"
                );
            }
        });
    }

    while join_set.join_next().await.is_some() {}
    Ok(())
}

/// One pass over one subscription: serve pending redelivery requests,
/// then walk matching events from the cursor in global-position order.
async fn process_subscription(
    inner: &DispatcherInner,
    subscription: &Subscription,
) -> Result<(), StoreError> {
    serve_retry_requests(inner, subscription).await?;

    let mut position = subscription.position;
    loop {
        if !inner.is_running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let batch = inner
            .events
            .read_matching(
                &subscription.event_types,
                &subscription.aggregate_types,
                position,
                inner.config.batch_size,
            )
            .await?;
        if batch.is_empty() {
            return Ok(());
        }

        for event in batch {
            match inner
                .transport
                .deliver(&subscription.callback_url, &event)
                .await
            {
                Ok(()) => {
                    inner.clear_attempts(subscription.id, event.event_id);
                    position = event.global_position;
                    inner
                        .subscriptions
                        .update_retry_state(subscription.id, None, position)
                        .await?;
                    tracing::debug!(
                        subscription_id = %subscription.id,
                        event_id = %event.event_id,
                        global_position = position,
                        "delivered"
                    );
                }
                Err(failure) => {
                    let attempts = inner.bump_attempts(subscription.id, event.event_id);
                    if attempts >= subscription.max_retries {
                        dead_letter_event(inner, subscription, &event, &failure, attempts).await?;
                        inner.clear_attempts(subscription.id, event.event_id);
                        position = event.global_position;
                    } else {
                        let next_retry_at = inner.retry_hold(attempts);
                        inner
                            .subscriptions
                            .update_retry_state(subscription.id, Some(next_retry_at), position)
                            .await?;
                        tracing::warn!(
                            subscription_id = %subscription.id,
                            event_id = %event.event_id,
                            attempts,
                            %next_retry_at,
                            error = %failure,
                            "delivery failed, retry scheduled"
                        );
                        // Head-of-line: later events wait for this one.
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Exhausted budget: capture the envelope and advance the cursor past the
/// event, atomically.
async fn dead_letter_event(
    inner: &DispatcherInner,
    subscription: &Subscription,
    event: &EventEnvelope,
    failure: &DeliveryFailure,
    attempts: i32,
) -> Result<(), StoreError> {
    let captured = serde_json::to_value(event)
        .map_err(|e| StoreError::Storage(format!("failed to capture envelope: {e}")))?;

    inner
        .dead_letters
        .enqueue_and_advance(
            NewDeadLetter {
                subscription_id: subscription.id,
                original_event_id: event.event_id,
                event_type: event.event_type.clone(),
                payload: captured,
                error_message: failure.to_string(),
                exception_type: Some(failure.kind().to_owned()),
                retry_count: attempts,
                max_retries: subscription.max_retries,
            },
            event.global_position,
        )
        .await?;
    Ok(())
}

/// Serves operator retry requests for one subscription: each captured
/// envelope gets a fresh budget; success resolves the entry, exhaustion
/// re-upserts it.
async fn serve_retry_requests(
    inner: &DispatcherInner,
    subscription: &Subscription,
) -> Result<(), StoreError> {
    let entries = inner.dead_letters.take_retry_requests(subscription.id).await?;
    for entry in entries {
        let envelope: EventEnvelope = match serde_json::from_value(entry.payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(
                    dead_letter_id = %entry.id,
                    error = %err,
                    "captured payload is not a valid envelope, skipping redelivery"
                );
                continue;
            }
        };
        redeliver(inner, subscription, &entry, &envelope).await?;
    }
    Ok(())
}

async fn redeliver(
    inner: &DispatcherInner,
    subscription: &Subscription,
    entry: &DeadLetterEntry,
    envelope: &EventEnvelope,
) -> Result<(), StoreError> {
    let mut attempts: i32 = 0;
    loop {
        match inner
            .transport
            .deliver(&subscription.callback_url, envelope)
            .await
        {
            Ok(()) => {
                inner.dead_letters.mark_resolved(entry.id).await?;
                tracing::info!(
                    dead_letter_id = %entry.id,
                    subscription_id = %subscription.id,
                    "dead letter redelivered and resolved"
                );
                return Ok(());
            }
            Err(failure) => {
                attempts += 1;
                if attempts >= subscription.max_retries {
                    // Re-upsert the same (subscription, event) pair; no
                    // duplicate entry is created.
                    inner
                        .dead_letters
                        .enqueue(NewDeadLetter {
                            subscription_id: subscription.id,
                            original_event_id: entry.original_event_id,
                            event_type: entry.event_type.clone(),
                            payload: entry.payload.clone(),
                            error_message: failure.to_string(),
                            exception_type: Some(failure.kind().to_owned()),
                            retry_count: attempts,
                            max_retries: subscription.max_retries,
                        })
                        .await?;
                    tracing::warn!(
                        dead_letter_id = %entry.id,
                        attempts,
                        "redelivery exhausted, entry re-dead-lettered"
                    );
                    return Ok(());
                }

                let attempt = u32::try_from(attempts).unwrap_or(u32::MAX);
                let delay = inner
                    .config
                    .backoff
                    .delay_for_attempt(attempt, inner.jitter.as_ref());
                tokio::time::sleep(delay).await;
            }
        }
    }
}
