//! Health check endpoint.
//!
//! Reports liveness and whether each telemetry destination is configured.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Telemetry destinations and their state.
#[derive(Debug, Serialize)]
pub struct TelemetryStatus {
    /// Metric export is configured.
    pub metrics_enabled: bool,
    /// Log shipping is configured.
    pub logs_enabled: bool,
    /// Records waiting for the next flush.
    pub pending_logs: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (always "healthy" if reachable).
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Telemetry pipeline state.
    pub telemetry: TelemetryStatus,
}

/// Creates the health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let telemetry = state.telemetry();
    Json(HealthResponse {
        status: "healthy",
        service: "slicewatch-api",
        version: env!("CARGO_PKG_VERSION"),
        telemetry: TelemetryStatus {
            metrics_enabled: telemetry.exporter().is_enabled(),
            logs_enabled: telemetry.logs().is_enabled(),
            pending_logs: telemetry.logs().pending(),
        },
    })
}
