//! Routes for the subscription registry.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use meridian_core::subscription::{DEFAULT_MAX_RETRIES, NewSubscription, Subscription};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /subscriptions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSubscriptionRequest {
    /// Unique subscription name.
    pub name: String,
    /// Event types to fire for. Must be non-empty.
    pub event_types: Vec<String>,
    /// Aggregate types to fire for. Empty or omitted means all.
    #[serde(default)]
    pub aggregate_types: Vec<String>,
    /// Webhook URL events are POSTed to.
    pub callback_url: String,
    /// Per-event retry budget.
    pub max_retries: Option<i32>,
}

/// POST /subscriptions
async fn register_subscription(
    State(state): State<AppState>,
    Json(request): Json<RegisterSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let registration = NewSubscription {
        name: request.name,
        event_types: request.event_types,
        aggregate_types: request.aggregate_types,
        callback_url: request.callback_url,
        max_retries: request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
    };
    let subscription = state.subscriptions.register(registration).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /subscriptions
async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let subscriptions = state.subscriptions.list().await?;
    Ok(Json(subscriptions))
}

/// PATCH /subscriptions/{id}/activate
async fn activate_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>, ApiError> {
    let subscription = state.subscriptions.set_active(id, true).await?;
    Ok(Json(subscription))
}

/// PATCH /subscriptions/{id}/deactivate
async fn deactivate_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>, ApiError> {
    let subscription = state.subscriptions.set_active(id, false).await?;
    Ok(Json(subscription))
}

/// Returns the subscription registry router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subscriptions).post(register_subscription))
        .route("/{id}/activate", patch(activate_subscription))
        .route("/{id}/deactivate", patch(deactivate_subscription))
}
