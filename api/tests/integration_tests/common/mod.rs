//! Common test utilities and helpers for integration tests.
//!
//! Builds an instrumented router around stub business routes (auth, order,
//! menu) that behave like the collaborators of a real service, backed by a
//! pipeline whose sinks capture payloads in memory.

use api::{instrument, AppState, AuthenticatedUser, InstrumentationConfig};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{self, header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use telemetry::logs::LogPush;
use telemetry::transport::{DeliveryError, LogSink, MetricsSink};
use telemetry::{Telemetry, TelemetryConfig};

/// Log sink that keeps every push.
#[derive(Default)]
pub struct CapturingLogSink {
    pub pushes: Mutex<Vec<LogPush>>,
}

#[async_trait]
impl LogSink for CapturingLogSink {
    async fn push_streams(&self, payload: &LogPush) -> Result<(), DeliveryError> {
        self.pushes.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Metrics sink that keeps every payload.
#[derive(Default)]
pub struct CapturingMetricsSink {
    pub payloads: Mutex<Vec<String>>,
}

#[async_trait]
impl MetricsSink for CapturingMetricsSink {
    async fn push_lines(&self, payload: String) -> Result<(), DeliveryError> {
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Everything a test needs to drive and inspect the instrumented service.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub logs: Arc<CapturingLogSink>,
    pub metrics: Arc<CapturingMetricsSink>,
}

/// Creates a test app with default instrumentation settings.
pub fn test_app() -> TestApp {
    test_app_with(InstrumentationConfig::default())
}

/// Creates a test app with custom instrumentation settings.
pub fn test_app_with(settings: InstrumentationConfig) -> TestApp {
    let logs = Arc::new(CapturingLogSink::default());
    let metrics = Arc::new(CapturingMetricsSink::default());

    let telemetry = Telemetry::builder(TelemetryConfig::new("pizza-service"))
        .with_log_sink(Arc::clone(&logs) as Arc<dyn LogSink>)
        .with_metrics_sink(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
        .without_system_probe()
        .build()
        .unwrap();
    let state = AppState::new(Arc::new(telemetry), settings);

    let business = Router::new()
        .route("/api/auth", put(login).delete(logout))
        .route("/api/order", post(order))
        .route("/api/order/menu", get(menu))
        .route("/api/fail", get(fail))
        .with_state(state.clone());

    let router = instrument(
        business.merge(api::routes::health_routes(state.clone())),
        state.clone(),
    )
    .layer(middleware::from_fn(authenticate));

    TestApp {
        router,
        state,
        logs,
        metrics,
    }
}

/// Marks requests carrying `Authorization: Bearer user:<id>` as authenticated
/// before the instrumentation hook runs.
async fn authenticate(mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer user:"))
        .map(str::to_string);
    if let Some(user) = user {
        request.extensions_mut().insert(AuthenticatedUser(user));
    }
    next.run(request).await
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == "correct-horse" {
        let email = body["email"].as_str().unwrap_or_default().to_string();
        let mut response = Json(json!({
            "user": {"email": email, "roles": ["diner"]},
            "token": "eyJhbGciOi.jwt.body",
        }))
        .into_response();
        response.extensions_mut().insert(AuthenticatedUser(email));
        response
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "unknown user"}))).into_response()
    }
}

async fn logout() -> Json<Value> {
    Json(json!({"message": "logout successful"}))
}

async fn order(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let telemetry = state.telemetry();
    let items = body["items"].as_array().cloned().unwrap_or_default();
    let revenue: f64 = items.iter().filter_map(|i| i["price"].as_f64()).sum();
    let count = items.len() as u64;

    let factory_response = json!({"reportUrl": "https://factory.example.com/r/1", "jwt": "factory-jwt"});
    telemetry
        .logs()
        .log_factory_request(&body, Some(&factory_response), Some(200), 42.0, None);
    telemetry
        .metrics()
        .track_pizza_purchase(true, Some(42.0), count, revenue);

    Json(json!({"order": body, "followLinkToEndChaos": "https://factory.example.com/r/1"}))
        .into_response()
}

async fn menu(State(state): State<AppState>) -> Json<Value> {
    state
        .telemetry()
        .logs()
        .log_database_query("SELECT * FROM menu", &json!([]), 1.2, None);
    Json(json!([{"id": 1, "title": "Veggie", "price": 0.0038}]))
}

async fn fail() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response()
}

/// Sends a request and returns the status and JSON body (Null if not JSON).
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = tower::ServiceExt::oneshot(app, builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, json)
}

/// Helper to make a GET request.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, &[], None).await
}
