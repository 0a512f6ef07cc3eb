//! Telemetry configuration.
//!
//! Destinations, credentials and cadences for the metric exporter and the log
//! shipper. An exporter whose endpoint is absent is inert: it skips every
//! cycle without reporting an error.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Default metric export period.
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 10;
/// Default periodic log flush period.
pub const DEFAULT_LOGS_INTERVAL_SECS: u64 = 5;
/// Default buffer length that triggers an early log flush.
pub const DEFAULT_LOG_FLUSH_THRESHOLD: usize = 100;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric variable could not be parsed.
    #[error("Invalid value '{value}' for {var}")]
    InvalidNumber {
        /// Name of the offending variable.
        var: String,
        /// The raw value.
        value: String,
    },

    /// The counter mode is not `cumulative` or `delta`.
    #[error("Invalid counter mode '{0}' (expected 'cumulative' or 'delta')")]
    InvalidCounterMode(String),

    /// Field-level validation failed.
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// How counters behave across exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    /// Counters are running totals since process start.
    #[default]
    Cumulative,
    /// Counters are reset to zero by every snapshot.
    Delta,
}

impl std::str::FromStr for CounterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cumulative" => Ok(Self::Cumulative),
            "delta" => Ok(Self::Delta),
            _ => Err(ConfigError::InvalidCounterMode(s.to_string())),
        }
    }
}

/// A remote backend and its credentials.
///
/// Requests carry `Authorization: Bearer <user_id>:<api_key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    /// Push URL.
    #[validate(url(message = "Endpoint URL must be a valid URL"))]
    pub url: String,

    /// Account or instance identifier.
    #[validate(length(min = 1, message = "User id cannot be empty"))]
    pub user_id: String,

    /// API key. Never serialized.
    #[serde(skip_serializing, default)]
    #[validate(length(min = 1, message = "API key cannot be empty"))]
    pub api_key: String,
}

impl EndpointConfig {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        user_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user_id: user_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Bearer token value (`<user_id>:<api_key>`).
    #[must_use]
    pub fn bearer_token(&self) -> String {
        format!("{}:{}", self.user_id, self.api_key)
    }

    /// API key with all but the last four characters masked.
    #[must_use]
    pub fn masked_api_key(&self) -> String {
        let count = self.api_key.chars().count();
        if count <= 4 {
            return "****".to_string();
        }
        let tail: String = self.api_key.chars().skip(count - 4).collect();
        format!("****{tail}")
    }
}

/// Complete telemetry configuration.
///
/// # Example
///
/// ```
/// use telemetry::config::{EndpointConfig, TelemetryConfig};
///
/// let config = TelemetryConfig::new("pizza-service")
///     .with_logs(EndpointConfig::new("https://logs.example.com/push", "1234", "key"));
///
/// assert!(config.validate_config().is_ok());
/// assert!(config.metrics.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Value of the `source` label on every sample and stream.
    #[validate(length(min = 1, message = "Source cannot be empty"))]
    pub source: String,

    /// Metrics backend. `None` disables export.
    pub metrics: Option<EndpointConfig>,

    /// Log backend. `None` disables shipping.
    pub logs: Option<EndpointConfig>,

    /// Seconds between metric exports.
    #[validate(range(min = 1, message = "Metrics interval must be at least 1 second"))]
    pub metrics_interval_secs: u64,

    /// Seconds between periodic log flushes.
    #[validate(range(min = 1, message = "Logs interval must be at least 1 second"))]
    pub logs_interval_secs: u64,

    /// Buffer length that triggers an immediate flush.
    #[validate(range(min = 1, message = "Flush threshold must be at least 1"))]
    pub log_flush_threshold: usize,

    /// Counter reset policy.
    pub counter_mode: CounterMode,

    /// Timeout applied to every push request.
    #[validate(range(min = 1, message = "Request timeout must be at least 1 second"))]
    pub request_timeout_secs: u64,

    /// Upper bound for the final log flush on shutdown.
    pub shutdown_flush_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            source: "slicewatch".to_string(),
            metrics: None,
            logs: None,
            metrics_interval_secs: DEFAULT_METRICS_INTERVAL_SECS,
            logs_interval_secs: DEFAULT_LOGS_INTERVAL_SECS,
            log_flush_threshold: DEFAULT_LOG_FLUSH_THRESHOLD,
            counter_mode: CounterMode::default(),
            request_timeout_secs: 10,
            shutdown_flush_timeout_secs: 5,
        }
    }
}

impl TelemetryConfig {
    /// Creates a configuration with both exporters disabled.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Sets the metrics endpoint.
    #[must_use]
    pub fn with_metrics(mut self, endpoint: EndpointConfig) -> Self {
        self.metrics = Some(endpoint);
        self
    }

    /// Sets the log endpoint.
    #[must_use]
    pub fn with_logs(mut self, endpoint: EndpointConfig) -> Self {
        self.logs = Some(endpoint);
        self
    }

    /// Loads configuration from `SLICEWATCH_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed, or if the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Recognized variables:
    /// - `SLICEWATCH_SOURCE`
    /// - `SLICEWATCH_METRICS_URL`, `SLICEWATCH_METRICS_USER_ID`, `SLICEWATCH_METRICS_API_KEY`
    /// - `SLICEWATCH_LOGS_URL`, `SLICEWATCH_LOGS_USER_ID`, `SLICEWATCH_LOGS_API_KEY`
    /// - `SLICEWATCH_METRICS_INTERVAL_SECS`, `SLICEWATCH_LOGS_INTERVAL_SECS`
    /// - `SLICEWATCH_LOG_FLUSH_THRESHOLD`, `SLICEWATCH_COUNTER_MODE`
    /// - `SLICEWATCH_REQUEST_TIMEOUT_SECS`, `SLICEWATCH_SHUTDOWN_FLUSH_TIMEOUT_SECS`
    ///
    /// An endpoint is configured only when its URL, user id and API key are
    /// all non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed, or if the
    /// resulting configuration fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            source: get("SLICEWATCH_SOURCE").unwrap_or(defaults.source),
            metrics: endpoint_from(&get, "METRICS"),
            logs: endpoint_from(&get, "LOGS"),
            metrics_interval_secs: parse_or(
                &get,
                "SLICEWATCH_METRICS_INTERVAL_SECS",
                defaults.metrics_interval_secs,
            )?,
            logs_interval_secs: parse_or(
                &get,
                "SLICEWATCH_LOGS_INTERVAL_SECS",
                defaults.logs_interval_secs,
            )?,
            log_flush_threshold: parse_or(
                &get,
                "SLICEWATCH_LOG_FLUSH_THRESHOLD",
                defaults.log_flush_threshold,
            )?,
            counter_mode: get("SLICEWATCH_COUNTER_MODE")
                .map(|v| v.parse::<CounterMode>())
                .transpose()?
                .unwrap_or(defaults.counter_mode),
            request_timeout_secs: parse_or(
                &get,
                "SLICEWATCH_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            shutdown_flush_timeout_secs: parse_or(
                &get,
                "SLICEWATCH_SHUTDOWN_FLUSH_TIMEOUT_SECS",
                defaults.shutdown_flush_timeout_secs,
            )?,
        };

        config.validate_config()?;
        Ok(config)
    }

    /// Validates the configuration including configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is out of range or an endpoint is invalid.
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate()?;
        for endpoint in [&self.metrics, &self.logs].into_iter().flatten() {
            endpoint.validate()?;
        }
        Ok(())
    }

    /// Metric export period.
    #[must_use]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    /// Periodic log flush period.
    #[must_use]
    pub fn logs_interval(&self) -> Duration {
        Duration::from_secs(self.logs_interval_secs)
    }

    /// Push request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bound on the final flush.
    #[must_use]
    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_flush_timeout_secs)
    }
}

fn endpoint_from<G>(get: &G, prefix: &str) -> Option<EndpointConfig>
where
    G: Fn(&str) -> Option<String>,
{
    let url = get(&format!("SLICEWATCH_{prefix}_URL"))?;
    let user_id = get(&format!("SLICEWATCH_{prefix}_USER_ID"))?;
    let api_key = get(&format!("SLICEWATCH_{prefix}_API_KEY"))?;
    Some(EndpointConfig::new(url, user_id, api_key))
}

fn parse_or<G, T>(get: &G, var: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber {
                var: var.to_string(),
                value,
            }),
        None => Ok(default),
    }
}
