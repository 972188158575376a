//! `PostgreSQL` implementation of the `SubscriptionStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use meridian_core::clock::{Clock, SystemClock};
use meridian_core::error::StoreError;
use meridian_core::store::SubscriptionStore;
use meridian_core::subscription::{NewSubscription, Subscription};

use crate::pg::{is_unique_violation, storage_err};

const NAME_CONSTRAINT: &str = "subscriptions_name_key";

const SUBSCRIPTION_COLUMNS: &str = "id, name, event_types, aggregate_types, callback_url, \
     is_active, max_retries, next_retry_at, position, created_at";

/// PostgreSQL-backed subscription registry.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgSubscriptionStore {
    /// Creates a `PgSubscriptionStore` using the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a `PgSubscriptionStore` with an injected clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    name: String,
    event_types: Vec<String>,
    aggregate_types: Vec<String>,
    callback_url: String,
    is_active: bool,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    position: i64,
    created_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            event_types: row.event_types,
            aggregate_types: row.aggregate_types,
            callback_url: row.callback_url,
            is_active: row.is_active,
            max_retries: row.max_retries,
            next_retry_at: row.next_retry_at,
            position: row.position,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn register(&self, subscription: NewSubscription) -> Result<Subscription, StoreError> {
        subscription.validate()?;

        let id = Uuid::new_v4();
        let created_at = self.clock.now();

        let result = sqlx::query(
            "INSERT INTO subscriptions (id, name, event_types, aggregate_types, callback_url, \
             is_active, max_retries, next_retry_at, position, created_at) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, NULL, 0, $7)",
        )
        .bind(id)
        .bind(&subscription.name)
        .bind(&subscription.event_types)
        .bind(&subscription.aggregate_types)
        .bind(&subscription.callback_url)
        .bind(subscription.max_retries)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err, NAME_CONSTRAINT) => {
                return Err(StoreError::DuplicateSubscriptionName(subscription.name));
            }
            Err(err) => return Err(storage_err(err)),
        }

        tracing::info!(subscription_id = %id, name = %subscription.name, "registered subscription");

        Ok(Subscription {
            id,
            name: subscription.name,
            event_types: subscription.event_types,
            aggregate_types: subscription.aggregate_types,
            callback_url: subscription.callback_url,
            is_active: true,
            max_retries: subscription.max_retries,
            next_retry_at: None,
            position: 0,
            created_at,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Subscription, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(Subscription::from)
            .ok_or(StoreError::SubscriptionNotFound(id))
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE is_active AND (next_retry_at IS NULL OR next_retry_at <= $1) \
             ORDER BY created_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Subscription, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "UPDATE subscriptions SET is_active = $2 WHERE id = $1 \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(Subscription::from)
            .ok_or(StoreError::SubscriptionNotFound(id))
    }

    async fn update_retry_state(
        &self,
        id: Uuid,
        next_retry_at: Option<DateTime<Utc>>,
        position: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET next_retry_at = $2, position = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(next_retry_at)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SubscriptionNotFound(id));
        }
        Ok(())
    }
}
