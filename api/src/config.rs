//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use telemetry::TelemetryConfig;

/// Default path of the authentication endpoint.
pub const DEFAULT_AUTH_PATH: &str = "/api/auth";
/// Default upper bound for captured request and response bodies.
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Settings for the request instrumentation hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationConfig {
    /// Requests to this path (or below it) with POST or PUT count as auth attempts.
    pub auth_path: String,
    /// Whether request and response bodies are attached to HTTP log records.
    pub capture_bodies: bool,
    /// Bodies larger than this, or of unknown size, are never captured.
    pub max_capture_bytes: usize,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            capture_bodies: true,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

impl InstrumentationConfig {
    /// Returns true if a request with `method` to `path` is an auth attempt.
    #[must_use]
    pub fn is_auth_attempt(&self, method: &str, path: &str) -> bool {
        if !matches!(method, "POST" | "PUT") {
            return false;
        }
        let auth_path = self.auth_path.trim_end_matches('/');
        if auth_path.is_empty() {
            return false;
        }
        path == auth_path
            || path
                .strip_prefix(auth_path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `SLICEWATCH_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `SLICEWATCH_PORT`: The port to listen on (default: 8080)
/// - `SLICEWATCH_AUTH_PATH`: Authentication endpoint (default: "/api/auth")
/// - `SLICEWATCH_CAPTURE_BODIES`: Attach bodies to HTTP logs (default: true)
/// - `SLICEWATCH_MAX_CAPTURE_BYTES`: Body capture limit (default: 65536)
///
/// Telemetry endpoints are read by [`TelemetryConfig::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Instrumentation hook settings.
    pub instrumentation: InstrumentationConfig,
    /// Telemetry pipeline settings.
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `SLICEWATCH_PORT` is set but cannot be parsed as a valid port number
    /// - a boolean or numeric instrumentation variable is malformed
    /// - the telemetry configuration is invalid
    pub fn from_env() -> Result<Self> {
        let defaults = InstrumentationConfig::default();

        let host = std::env::var("SLICEWATCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("SLICEWATCH_PORT")
            .ok()
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("SLICEWATCH_PORT must be a valid port number")?
            .unwrap_or(8080);

        let auth_path =
            std::env::var("SLICEWATCH_AUTH_PATH").unwrap_or(defaults.auth_path);

        let capture_bodies = std::env::var("SLICEWATCH_CAPTURE_BODIES")
            .ok()
            .map(|v| v.parse::<bool>())
            .transpose()
            .context("SLICEWATCH_CAPTURE_BODIES must be 'true' or 'false'")?
            .unwrap_or(defaults.capture_bodies);

        let max_capture_bytes = std::env::var("SLICEWATCH_MAX_CAPTURE_BYTES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("SLICEWATCH_MAX_CAPTURE_BYTES must be a number")?
            .unwrap_or(defaults.max_capture_bytes);

        let telemetry = TelemetryConfig::from_env().context("Invalid telemetry configuration")?;

        Ok(Self {
            host,
            port,
            instrumentation: InstrumentationConfig {
                auth_path,
                capture_bodies,
                max_capture_bytes,
            },
            telemetry,
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            instrumentation: InstrumentationConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
