//! Routes for the snapshot store.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use meridian_core::snapshot::{NewSnapshot, Snapshot};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /snapshots
async fn save_snapshot(
    State(state): State<AppState>,
    Json(snapshot): Json<NewSnapshot>,
) -> Result<(StatusCode, Json<Snapshot>), ApiError> {
    let stored = state.snapshots.save(snapshot).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /snapshots/{aggregate_id}/latest
///
/// Returns JSON `null` when the aggregate has no snapshot; replay then
/// starts at sequence 1.
async fn latest_snapshot(
    State(state): State<AppState>,
    Path(aggregate_id): Path<Uuid>,
) -> Result<Json<Option<Snapshot>>, ApiError> {
    let snapshot = state.snapshots.latest(aggregate_id).await?;
    Ok(Json(snapshot))
}

/// Returns the snapshot router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(save_snapshot))
        .route("/{aggregate_id}/latest", get(latest_snapshot))
}
