//! Integration tests for export and flush after real traffic.
//!
//! Tests cover:
//! - Metric line payload built from instrumented requests
//! - Log streams grouped by level and category
//! - Empty windows make no delivery calls

use serde_json::json;
use telemetry::logs::FlushOutcome;
use telemetry::metrics::ExportOutcome;

use super::common::{get_json, send, test_app};

#[tokio::test]
async fn test_export_after_traffic() {
    let app = test_app();

    get_json(app.router.clone(), "/health").await;
    send(
        app.router.clone(),
        "PUT",
        "/api/auth",
        &[],
        Some(json!({"email": "a@jwt.com", "password": "correct-horse"})),
    )
    .await;

    let outcome = app.state.telemetry().exporter().export().await;
    assert!(matches!(outcome, ExportOutcome::Delivered { .. }));

    let payloads = app.metrics.payloads.lock().unwrap();
    let lines: Vec<&str> = payloads[0].lines().collect();
    assert!(lines.contains(&"http_requests_total,source=pizza-service,type=counter value=2"));
    assert!(lines.contains(&"http_requests_get,source=pizza-service,type=counter value=1"));
    assert!(lines.contains(&"auth_success_total,source=pizza-service,type=counter value=1"));
    assert!(lines.contains(&"active_users,source=pizza-service,type=gauge value=1"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("service_latency_avg_ms,source=pizza-service,type=gauge value=")));
    assert!(!lines.iter().any(|l| l.starts_with("auth_failure_total")));
}

#[tokio::test]
async fn test_flush_after_traffic() {
    let app = test_app();

    get_json(app.router.clone(), "/health").await;
    get_json(app.router.clone(), "/api/fail").await;
    get_json(app.router.clone(), "/health").await;

    let outcome = app.state.telemetry().logs().flush().await;
    assert_eq!(outcome, FlushOutcome::Shipped { records: 3 });
    assert_eq!(app.state.telemetry().logs().pending(), 0);

    let pushes = app.logs.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    let wire = serde_json::to_value(&pushes[0]).unwrap();
    assert_eq!(
        wire["streams"][0]["stream"],
        json!({"level": "info", "type": "http", "source": "pizza-service"})
    );
    assert_eq!(wire["streams"][0]["values"].as_array().unwrap().len(), 2);
    assert_eq!(wire["streams"][1]["stream"]["level"], "error");
}

#[tokio::test]
async fn test_idle_window_makes_no_calls() {
    let app = test_app();

    assert_eq!(
        app.state.telemetry().exporter().export().await,
        ExportOutcome::Empty
    );
    assert_eq!(app.state.telemetry().logs().flush().await, FlushOutcome::Empty);
    assert!(app.metrics.payloads.lock().unwrap().is_empty());
    assert!(app.logs.pushes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_background_loops_and_shutdown() {
    let app = test_app();
    app.state.telemetry().start();

    get_json(app.router.clone(), "/health").await;

    let outcome = app.state.telemetry().shutdown().await;
    assert_eq!(outcome, FlushOutcome::Shipped { records: 1 });
    assert_eq!(app.logs.pushes.lock().unwrap().len(), 1);
}
