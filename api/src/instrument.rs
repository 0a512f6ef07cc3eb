//! Request instrumentation hook.
//!
//! Runs once per request as an axum middleware. On entry it counts the request
//! and tracks an already authenticated user; after the inner service has
//! produced the final response it classifies auth attempts, records latency and
//! emits one HTTP log record.
//!
//! Handlers that authenticate a caller during the request report the user by
//! inserting [`AuthenticatedUser`] into the response extensions.

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Instant;
use telemetry::logs::HttpRequestLog;

use crate::config::InstrumentationConfig;
use crate::state::AppState;

/// Identifier of the caller, set by whatever authenticates the request.
///
/// Read from the request extensions on entry and from the response extensions
/// on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Middleware feeding the metric aggregator and the log shipper.
///
/// Never rejects or alters a request. Bodies are only buffered when their
/// size is known and within the configured limit.
pub async fn instrument_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let telemetry = state.telemetry();
    let settings = state.instrumentation();

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let has_credentials = request.headers().contains_key(AUTHORIZATION);
    let ip = client_ip(&request);
    let entry_user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone());

    telemetry.metrics().record_request(&method);
    telemetry.metrics().track_active_user(entry_user.as_deref());

    let (request, request_body) = capture_request(request, settings).await;

    let response = next.run(request).await;

    let status = response.status();
    let exit_user = response
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone());
    if entry_user.is_none() {
        telemetry.metrics().track_active_user(exit_user.as_deref());
    }

    if settings.is_auth_attempt(&method, &path) {
        telemetry.metrics().track_auth_attempt(status.is_success());
    }

    let (response, response_body) = capture_response(response, settings).await;

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    telemetry.metrics().record_service_latency(duration_ms);

    telemetry.logs().log_http_request(&HttpRequestLog {
        method,
        path,
        status: status.as_u16(),
        duration_ms,
        ip,
        user_id: entry_user.or(exit_user),
        has_credentials,
        request_body,
        response_body,
    });

    response
}

/// First `x-forwarded-for` hop, else the connection peer.
fn client_ip(request: &Request) -> Option<String> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

/// Returns the body size if it is known and small enough to capture.
fn capturable_len(body: &Body, settings: &InstrumentationConfig) -> Option<usize> {
    if !settings.capture_bodies {
        return None;
    }
    let len = usize::try_from(body.size_hint().exact()?).ok()?;
    (len <= settings.max_capture_bytes).then_some(len)
}

async fn capture_request(
    request: Request,
    settings: &InstrumentationConfig,
) -> (Request, Option<Value>) {
    let Some(limit) = capturable_len(request.body(), settings) else {
        return (request, None);
    };

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let captured = decode_body(&bytes);
            (Request::from_parts(parts, Body::from(bytes)), captured)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body for capture");
            (Request::from_parts(parts, Body::empty()), None)
        }
    }
}

async fn capture_response(
    response: Response,
    settings: &InstrumentationConfig,
) -> (Response, Option<Value>) {
    let Some(limit) = capturable_len(response.body(), settings) else {
        return (response, None);
    };

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let captured = decode_body(&bytes);
            (Response::from_parts(parts, Body::from(bytes)), captured)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read response body for capture");
            (Response::from_parts(parts, Body::empty()), None)
        }
    }
}

/// JSON bodies are parsed so nested keys can be redacted; anything else is
/// kept as text.
fn decode_body(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}
