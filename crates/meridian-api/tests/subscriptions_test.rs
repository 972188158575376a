//! Integration tests for the subscription registry endpoints.

mod common;

use axum::http::StatusCode;
use uuid::Uuid;

fn register_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "eventTypes": ["SpacecraftCreated"],
        "callbackUrl": "http://consumer.local/hook",
    })
}

#[tokio::test]
async fn test_register_returns_201_with_active_subscription() {
    let (app, _backend) = common::build_test_app();

    let (status, json) =
        common::post_json(app, "/api/v1/subscriptions", &register_body("ops-feed")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(json["id"].is_string());
    assert_eq!(json["name"], "ops-feed");
    assert_eq!(json["isActive"], true);
    assert_eq!(json["position"], 0);
    assert_eq!(json["maxRetries"], 5);
    assert!(json["nextRetryAt"].is_null());
}

#[tokio::test]
async fn test_register_duplicate_name_returns_409() {
    let (app, _backend) = common::build_test_app();

    let (status, _) =
        common::post_json(app.clone(), "/api/v1/subscriptions", &register_body("ops")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) =
        common::post_json(app, "/api/v1/subscriptions", &register_body("ops")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "duplicate_subscription_name");
}

#[tokio::test]
async fn test_register_rejects_empty_event_types_and_bad_callback() {
    let (app, _backend) = common::build_test_app();

    let (status, json) = common::post_json(
        app.clone(),
        "/api/v1/subscriptions",
        &serde_json::json!({
            "name": "no-filter",
            "eventTypes": [],
            "callbackUrl": "http://consumer.local/hook",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");

    let (status, json) = common::post_json(
        app,
        "/api/v1/subscriptions",
        &serde_json::json!({
            "name": "bad-url",
            "eventTypes": ["SpacecraftCreated"],
            "callbackUrl": "not-a-url",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_list_returns_registered_subscriptions() {
    let (app, _backend) = common::build_test_app();

    common::post_json(app.clone(), "/api/v1/subscriptions", &register_body("a")).await;
    common::post_json(app.clone(), "/api/v1/subscriptions", &register_body("b")).await;

    let (status, json) = common::get_json(app, "/api/v1/subscriptions").await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_deactivate_and_activate_flip_is_active() {
    let (app, _backend) = common::build_test_app();

    let (_, created) =
        common::post_json(app.clone(), "/api/v1/subscriptions", &register_body("ops")).await;
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, json) =
        common::patch(app.clone(), &format!("/api/v1/subscriptions/{id}/deactivate")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isActive"], false);

    let (status, json) =
        common::patch(app, &format!("/api/v1/subscriptions/{id}/activate")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isActive"], true);
}

#[tokio::test]
async fn test_activate_unknown_subscription_returns_404() {
    let (app, _backend) = common::build_test_app();

    let (status, json) = common::patch(
        app,
        &format!("/api/v1/subscriptions/{}/activate", Uuid::new_v4()),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "subscription_not_found");
}
