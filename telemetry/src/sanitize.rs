//! Redaction of sensitive fields.
//!
//! Every record handed to the log pipeline passes through [`sanitize`] before
//! it is buffered. Any object key whose lowercase form contains one of
//! [`REDACTED_KEYS`] has its value replaced with [`REDACTION_MARKER`], at
//! every nesting depth and regardless of the value's type.

use serde::Serialize;
use serde_json::{Map, Value};

/// Marker written in place of a redacted value.
pub const REDACTION_MARKER: &str = "***REDACTED***";

/// Marker used when a call-site value cannot be converted to JSON.
pub const UNSERIALIZABLE_MARKER: &str = "[unserializable]";

/// Case-insensitive key fragments that trigger redaction.
pub const REDACTED_KEYS: [&str; 6] = ["password", "token", "auth", "authorization", "jwt", "secret"];

/// Returns a redacted copy of `value`.
///
/// Objects are walked recursively. Arrays are walked so that objects nested
/// inside them are redacted too; primitive elements are copied unchanged.
/// The function is idempotent: `sanitize(&sanitize(v)) == sanitize(v)`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use telemetry::sanitize::sanitize;
///
/// let clean = sanitize(&json!({"password": "x", "nested": {"token": "y", "keep": "z"}}));
///
/// assert_eq!(
///     clean,
///     json!({"password": "***REDACTED***", "nested": {"token": "***REDACTED***", "keep": "z"}})
/// );
/// ```
#[must_use]
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

/// Converts any serializable value to JSON without redacting it.
///
/// A value that fails to serialize is replaced by [`UNSERIALIZABLE_MARKER`]
/// instead of propagating the error to the caller. Use this when the result
/// is redacted later anyway, e.g. as fields of a `LogRecord`.
#[must_use]
pub fn to_log_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Value could not be serialized for logging");
        Value::String(UNSERIALIZABLE_MARKER.to_string())
    })
}

/// Converts any serializable value to JSON and redacts it.
#[must_use]
pub fn sanitize_serializable<T: Serialize + ?Sized>(value: &T) -> Value {
    sanitize(&to_log_value(value))
}

/// Returns true if `key` names a sensitive field.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    REDACTED_KEYS.iter().any(|fragment| key.contains(fragment))
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                Value::String(REDACTION_MARKER.to_string())
            } else {
                sanitize(value)
            };
            (key.clone(), value)
        })
        .collect()
}
