//! Routes for dead letter inspection and resolution.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use meridian_core::dead_letter::DeadLetterEntry;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    subscription_id: Option<Uuid>,
    resolved: Option<bool>,
}

/// GET /dead-letters?subscriptionId=&resolved=
async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeadLetterEntry>>, ApiError> {
    let entries = state
        .dead_letters
        .list(query.subscription_id, query.resolved)
        .await?;
    Ok(Json(entries))
}

/// POST /dead-letters/{id}/retry
///
/// Flags the entry for redelivery with a fresh budget. 202: the actual
/// attempt happens on the dispatcher's next pass, and the entry is only
/// marked resolved after a successful delivery.
async fn retry_dead_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<DeadLetterEntry>), ApiError> {
    let entry = state.dead_letters.request_retry(id).await?;
    Ok((StatusCode::ACCEPTED, Json(entry)))
}

/// DELETE /dead-letters/{id}
async fn remove_dead_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.dead_letters.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the dead letter router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_dead_letters))
        .route("/{id}/retry", post(retry_dead_letter))
        .route("/{id}", delete(remove_dead_letter))
}
