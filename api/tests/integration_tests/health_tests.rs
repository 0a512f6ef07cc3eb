//! Integration tests for the health check endpoint.
//!
//! Tests cover:
//! - Health check response
//! - Health checks are instrumented like any other route

use axum::http::StatusCode;

use super::common::{get_json, test_app};

#[tokio::test]
async fn test_health_check() {
    let app = test_app();

    let (status, response) = get_json(app.router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert_eq!(response["service"], "slicewatch-api");
    assert_eq!(response["telemetry"]["logs_enabled"], true);
    assert_eq!(response["telemetry"]["metrics_enabled"], true);
}

#[tokio::test]
async fn test_health_check_reports_pending_logs() {
    let app = test_app();

    get_json(app.router.clone(), "/health").await;
    let (_, response) = get_json(app.router.clone(), "/health").await;

    // The first request's record is buffered before the second one runs.
    assert_eq!(response["telemetry"]["pending_logs"], 1);
    assert_eq!(app.state.telemetry().logs().pending(), 2);
}
