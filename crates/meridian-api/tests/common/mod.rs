//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use meridian_core::clock::Clock;
use meridian_core::registry::PayloadRegistry;
use meridian_event_store::memory::MemoryBackend;
use meridian_test_support::FixedClock;
use serde::Deserialize;
use tower::ServiceExt;

use meridian_api::routes;
use meridian_api::state::AppState;

/// Payload schema registered for `SpacecraftCreated` v1 in test apps.
#[derive(Debug, Deserialize)]
pub struct SpacecraftCreatedPayload {
    pub name: String,
}

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router over an in-memory backend with a
/// deterministic clock. Uses the same route structure as `main.rs`.
/// Returns the backend too, so tests can seed state directly.
pub fn build_test_app() -> (Router, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::with_clock(fixed_clock()));

    let mut registry = PayloadRegistry::new();
    registry.register::<SpacecraftCreatedPayload>("SpacecraftCreated", 1);

    let app_state = AppState::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Arc::new(registry),
    );

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/events", routes::events::router())
        .nest("/api/v1/snapshots", routes::snapshots::router())
        .nest("/api/v1/subscriptions", routes::subscriptions::router())
        .nest("/api/v1/dead-letters", routes::dead_letters::router())
        .with_state(app_state);

    (app, backend)
}

async fn send(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

/// Send a PATCH request with no body and return the response.
pub async fn patch(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "PATCH", uri, None).await
}

/// Send a DELETE request and return the response.
pub async fn delete(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "DELETE", uri, None).await
}
