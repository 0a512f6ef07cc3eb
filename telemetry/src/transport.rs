//! Delivery to remote backends.
//!
//! The exporter and the shipper talk to their backends through the
//! [`MetricsSink`] and [`LogSink`] traits, so tests and embedders can swap the
//! HTTP implementations for anything else.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::logs::LogPush;

/// Errors that can occur while delivering a payload.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request could not be sent or the response not read.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The payload could not be encoded.
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Any other sink-specific failure.
    #[error("Delivery failed: {0}")]
    Other(String),
}

/// Destination for metric payloads.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Pushes a newline-joined line payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload was not accepted.
    async fn push_lines(&self, payload: String) -> Result<(), DeliveryError>;
}

/// Destination for log payloads.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Pushes a batch of streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload was not accepted.
    async fn push_streams(&self, payload: &LogPush) -> Result<(), DeliveryError>;
}

/// Builds the HTTP client shared by both sinks.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("slicewatch-telemetry/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Metrics sink posting `text/plain` line payloads.
#[derive(Debug, Clone)]
pub struct HttpMetricsSink {
    client: reqwest::Client,
    endpoint: EndpointConfig,
}

impl HttpMetricsSink {
    /// Creates a sink for `endpoint`.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn push_lines(&self, payload: String) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint.url)
            .header(CONTENT_TYPE, "text/plain")
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.endpoint.bearer_token()),
            )
            .body(payload)
            .send()
            .await?;

        check_status(response).await
    }
}

/// Log sink posting JSON stream payloads.
#[derive(Debug, Clone)]
pub struct HttpLogSink {
    client: reqwest::Client,
    endpoint: EndpointConfig,
}

impl HttpLogSink {
    /// Creates a sink for `endpoint`.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn push_streams(&self, payload: &LogPush) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        let response = self
            .client
            .post(&self.endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.endpoint.bearer_token()),
            )
            .body(body)
            .send()
            .await?;

        check_status(response).await
    }
}

const MAX_ERROR_BODY: usize = 512;

async fn check_status(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(DeliveryError::Status {
        status: status.as_u16(),
        body,
    })
}
