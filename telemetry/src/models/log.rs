//! Log record model.
//!
//! Defines the `LogRecord` structure buffered by the log pipeline and the
//! severity levels used as stream labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sanitize::sanitize;

/// Category used for inbound HTTP request records.
pub const CATEGORY_HTTP: &str = "http";
/// Category used for database query records.
pub const CATEGORY_DATABASE: &str = "database";
/// Category used for outbound factory call records.
pub const CATEGORY_FACTORY: &str = "factory";
/// Category used for unhandled exceptions.
pub const CATEGORY_EXCEPTION: &str = "exception";

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// Warning conditions.
    Warn,
    /// Error conditions.
    Error,
}

impl LogLevel {
    /// Returns the lowercase label used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Maps an HTTP status code onto a level: 5xx is an error, 4xx a warning.
    #[must_use]
    pub fn for_status(status: u16) -> Self {
        match status {
            500..=u16::MAX => Self::Error,
            400..=499 => Self::Warn,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log record.
///
/// Records are immutable once created. The constructor redacts `fields`
/// before the record exists, so nothing downstream ever observes a
/// sensitive value.
///
/// # Example
///
/// ```
/// use telemetry::models::{LogLevel, LogRecord};
/// use serde_json::json;
///
/// let record = LogRecord::new(
///     LogLevel::Info,
///     "http",
///     "GET /api/order",
///     json!({"status": 200, "token": "abc"}),
/// );
///
/// assert_eq!(record.fields()["token"], "***REDACTED***");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    level: LogLevel,
    #[serde(rename = "type")]
    category: String,
    message: String,
    fields: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Creates a sanitized record stamped with the current time.
    ///
    /// A `fields` value that is not a JSON object is wrapped as
    /// `{"value": fields}`; `null` becomes an empty object.
    #[must_use]
    pub fn new(
        level: LogLevel,
        category: impl Into<String>,
        message: impl Into<String>,
        fields: Value,
    ) -> Self {
        Self::at(level, category, message, fields, Utc::now())
    }

    /// Creates a sanitized record with an explicit timestamp.
    #[must_use]
    pub fn at(
        level: LogLevel,
        category: impl Into<String>,
        message: impl Into<String>,
        fields: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let fields = match sanitize(&fields) {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_string(), other)]),
        };

        Self {
            level,
            category: category.into(),
            message: message.into(),
            fields,
            timestamp,
        }
    }

    /// Severity of the record.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Category label (`http`, `database`, ...).
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Redacted structured fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Creation time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Nanoseconds since the Unix epoch as a decimal string.
    ///
    /// Timestamps outside the range representable in `i64` nanoseconds
    /// (years before 1677 or after 2262) saturate.
    #[must_use]
    pub fn unix_nanos_string(&self) -> String {
        let nanos = self.timestamp.timestamp_nanos_opt().unwrap_or_else(|| {
            if self.timestamp.timestamp() < 0 {
                i64::MIN
            } else {
                i64::MAX
            }
        });
        nanos.to_string()
    }
}
