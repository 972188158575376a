//! Routes for the event log.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meridian_core::envelope::{EventEnvelope, NewEvent};

use crate::error::ApiError;
use crate::state::AppState;

/// Events returned per type scan when no limit is given.
const DEFAULT_SCAN_LIMIT: i64 = 100;

/// Body of `POST /events`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEventRequest {
    /// Aggregate the event belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate.
    pub aggregate_type: String,
    /// Stable event type name.
    pub event_type: String,
    /// The sequence number this append expects to claim.
    pub expected_sequence_number: i64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Correlation ID, if continuing an existing chain.
    pub correlation_id: Option<Uuid>,
    /// Event ID of the causing event, if any.
    pub causation_id: Option<Uuid>,
    /// Payload schema version. Defaults to 1.
    pub version: Option<i32>,
    /// Identity of the producing service.
    pub source_service: Option<String>,
}

/// POST /events
async fn append_event(
    State(state): State<AppState>,
    Json(request): Json<AppendEventRequest>,
) -> Result<(StatusCode, Json<EventEnvelope>), ApiError> {
    let mut event = NewEvent::new(
        request.aggregate_id,
        request.aggregate_type,
        request.event_type,
        request.expected_sequence_number,
        request.payload,
    );
    event.metadata = request.metadata;
    event.correlation_id = request.correlation_id;
    event.causation_id = request.causation_id;
    if let Some(version) = request.version {
        event.version = version;
    }
    if let Some(source_service) = request.source_service {
        event.source_service = source_service;
    }

    state
        .registry
        .validate(&event.event_type, event.version, &event.payload)?;

    let stored = state.events.append(event).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamQuery {
    from_sequence: Option<i64>,
}

/// GET /events/{aggregate_id}
async fn read_stream(
    State(state): State<AppState>,
    Path(aggregate_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<Json<Vec<EventEnvelope>>, ApiError> {
    let events = state
        .events
        .read_stream(aggregate_id, query.from_sequence.unwrap_or(1))
        .await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeScanQuery {
    event_type: String,
    after_position: Option<i64>,
    limit: Option<i64>,
}

/// Page of a cross-aggregate type scan. `lastPosition` feeds the next
/// request's `afterPosition`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypeScanResponse {
    events: Vec<EventEnvelope>,
    last_position: i64,
}

/// GET /events?eventType=&afterPosition=&limit=
async fn read_by_type(
    State(state): State<AppState>,
    Query(query): Query<TypeScanQuery>,
) -> Result<Json<TypeScanResponse>, ApiError> {
    let after_position = query.after_position.unwrap_or(0);
    let events = state
        .events
        .read_by_type(
            &query.event_type,
            after_position,
            query.limit.unwrap_or(DEFAULT_SCAN_LIMIT),
        )
        .await?;
    let last_position = events.last().map_or(after_position, |e| e.global_position);
    Ok(Json(TypeScanResponse {
        events,
        last_position,
    }))
}

/// GET /events/correlation/{correlation_id}
async fn read_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> Result<Json<Vec<EventEnvelope>>, ApiError> {
    let events = state.events.read_by_correlation(correlation_id).await?;
    Ok(Json(events))
}

/// Returns the event log router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(read_by_type).post(append_event))
        .route("/{aggregate_id}", get(read_stream))
        .route("/correlation/{correlation_id}", get(read_by_correlation))
}
