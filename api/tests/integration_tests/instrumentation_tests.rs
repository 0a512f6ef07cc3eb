//! Integration tests for the request instrumentation hook.
//!
//! Tests cover:
//! - Request counting by method
//! - Auth attempt classification
//! - Active user tracking from request and response
//! - HTTP log records, redaction and body capture
//! - Collaborator loggers called from handlers

use api::InstrumentationConfig;
use axum::http::StatusCode;
use serde_json::json;
use telemetry::models::LogLevel;

use super::common::{get_json, send, test_app, test_app_with};

#[tokio::test]
async fn test_requests_counted_by_method() {
    let app = test_app();

    get_json(app.router.clone(), "/health").await;
    send(app.router.clone(), "POST", "/api/order", &[], Some(json!({"items": []}))).await;
    send(app.router.clone(), "PUT", "/api/auth", &[], Some(json!({"password": "x"}))).await;
    send(app.router.clone(), "DELETE", "/api/auth", &[], None).await;
    let (status, _) = send(app.router.clone(), "PATCH", "/health", &[], None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let snapshot = app.state.telemetry().metrics().snapshot_and_reset();
    assert_eq!(snapshot.requests_total, 5);
    assert_eq!(snapshot.requests_get, 1);
    assert_eq!(snapshot.requests_post, 1);
    assert_eq!(snapshot.requests_put, 1);
    assert_eq!(snapshot.requests_delete, 1);
}

#[tokio::test]
async fn test_auth_attempts_classified() {
    let app = test_app();

    let (status, _) = send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[],
        Some(json!({"email": "d@jwt.com", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[],
        Some(json!({"email": "d@jwt.com", "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Neither is an attempt: wrong method.
    send(app.router.clone(), "DELETE", "/api/auth", &[], None).await;
    get_json(app.router.clone(), "/api/auth").await;

    let snapshot = app.state.telemetry().metrics().snapshot_and_reset();
    assert_eq!(snapshot.auth_attempts, 2);
    assert_eq!(snapshot.auth_successes, 1);
    assert_eq!(snapshot.auth_failures, 1);
}

#[tokio::test]
async fn test_active_users_from_request_and_response() {
    let app = test_app();
    let bearer = [("authorization", "Bearer user:42")];

    send(app.router.clone(), "GET", "/api/order/menu", &bearer, None).await;
    send(app.router.clone(), "GET", "/api/order/menu", &bearer, None).await;
    send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[],
        Some(json!({"email": "new@jwt.com", "password": "correct-horse"})),
    )
    .await;
    get_json(app.router.clone(), "/health").await;

    let snapshot = app.state.telemetry().metrics().snapshot_and_reset();
    assert_eq!(snapshot.active_users, 2);

    let snapshot = app.state.telemetry().metrics().snapshot_and_reset();
    assert_eq!(snapshot.active_users, 0);
}

#[tokio::test]
async fn test_http_record_is_redacted() {
    let app = test_app();

    send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[("x-forwarded-for", "198.51.100.4")],
        Some(json!({"email": "d@jwt.com", "password": "correct-horse"})),
    )
    .await;

    let records = app.state.telemetry().logs().pending_records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    let fields = record.fields();

    assert_eq!(record.category(), "http");
    assert_eq!(record.level(), LogLevel::Info);
    assert_eq!(record.message(), "PUT /api/auth 200");
    assert_eq!(fields["ip"], "198.51.100.4");
    assert_eq!(fields["user_id"], "d@jwt.com");
    assert_eq!(fields["has_credentials"], false);
    assert_eq!(fields["request_body"]["email"], "d@jwt.com");
    assert_eq!(fields["request_body"]["password"], "***REDACTED***");
    assert_eq!(fields["response_body"]["token"], "***REDACTED***");
    assert_eq!(fields["response_body"]["user"]["roles"][0], "diner");
}

#[tokio::test]
async fn test_status_drives_level() {
    let app = test_app();

    send(app.router.clone(), "PUT", "/api/auth", &[], Some(json!({"password": "no"}))).await;
    get_json(app.router.clone(), "/api/fail").await;
    get_json(app.router.clone(), "/health").await;

    let levels: Vec<_> = app
        .state
        .telemetry()
        .logs()
        .pending_records()
        .iter()
        .map(telemetry::models::LogRecord::level)
        .collect();
    assert_eq!(levels, vec![LogLevel::Warn, LogLevel::Error, LogLevel::Info]);
}

#[tokio::test]
async fn test_text_response_body_captured_as_string() {
    let app = test_app();

    get_json(app.router.clone(), "/api/fail").await;

    let records = app.state.telemetry().logs().pending_records();
    assert_eq!(records[0].fields()["response_body"], "database unavailable");
    assert!(records[0].fields().get("request_body").is_none());
}

#[tokio::test]
async fn test_oversized_body_passes_through_uncaptured() {
    let app = test_app_with(InstrumentationConfig {
        max_capture_bytes: 16,
        ..InstrumentationConfig::default()
    });

    let (status, body) = send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[],
        Some(json!({"email": "someone@example.com", "password": "correct-horse"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "someone@example.com");

    let records = app.state.telemetry().logs().pending_records();
    assert!(records[0].fields().get("request_body").is_none());
    assert!(records[0].fields().get("response_body").is_none());
}

#[tokio::test]
async fn test_capture_disabled() {
    let app = test_app_with(InstrumentationConfig {
        capture_bodies: false,
        ..InstrumentationConfig::default()
    });

    let (status, _) = send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[],
        Some(json!({"password": "correct-horse"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let records = app.state.telemetry().logs().pending_records();
    assert!(records[0].fields().get("request_body").is_none());
}

#[tokio::test]
async fn test_custom_auth_path() {
    let app = test_app_with(InstrumentationConfig {
        auth_path: "/api/order".to_string(),
        ..InstrumentationConfig::default()
    });

    send(app.router.clone(), "POST", "/api/order", &[], Some(json!({"items": []}))).await;
    send(app.router.clone(), "PUT", "/api/auth", &[], Some(json!({"password": "no"}))).await;

    let snapshot = app.state.telemetry().metrics().snapshot_and_reset();
    assert_eq!(snapshot.auth_attempts, 1);
    assert_eq!(snapshot.auth_successes, 1);
}

#[tokio::test]
async fn test_handler_collaborators_feed_pipeline() {
    let app = test_app();

    let (status, _) = send(
        app.router.clone(),
        "POST",
        "/api/order",
        &[("authorization", "Bearer user:7")],
        Some(json!({"items": [
            {"menuId": 1, "description": "Veggie", "price": 0.05},
            {"menuId": 2, "description": "Pepperoni", "price": 0.1}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    get_json(app.router.clone(), "/api/order/menu").await;

    let records = app.state.telemetry().logs().pending_records();
    let categories: Vec<_> = records.iter().map(|r| r.category().to_string()).collect();
    assert_eq!(categories, vec!["factory", "http", "database", "http"]);
    assert_eq!(records[0].fields()["response"]["jwt"], "***REDACTED***");
    assert_eq!(records[1].fields()["has_credentials"], true);
    assert_eq!(records[2].fields()["query"], "SELECT * FROM menu");

    let snapshot = app.state.telemetry().metrics().snapshot_and_reset();
    assert_eq!(snapshot.pizzas_sold, 2);
    assert!((snapshot.revenue - 0.15).abs() < 1e-9);
    assert_eq!(snapshot.pizza_latency_avg_ms, Some(42.0));
}
