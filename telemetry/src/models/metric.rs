//! Metric sample model.
//!
//! Defines the `MetricSample` structure produced by a snapshot and its
//! line-oriented wire encoding.

use serde::{Deserialize, Serialize};

/// Kind of metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A value accumulated between exports (e.g., request count).
    Counter,
    /// A point-in-time value recomputed at export (e.g., memory usage).
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
        }
    }
}

/// A single exported measurement.
///
/// # Example
///
/// ```
/// use telemetry::models::MetricSample;
///
/// let sample = MetricSample::counter("http_requests_total", 12.0, "pizza-service");
/// assert_eq!(
///     sample.to_line(),
///     "http_requests_total,source=pizza-service,type=counter value=12"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// The metric name (e.g., "`http_requests_total`").
    pub name: String,

    /// The sample value.
    pub value: f64,

    /// Counter or gauge.
    pub kind: MetricKind,

    /// Value of the `source` label.
    pub source: String,
}

impl MetricSample {
    /// Creates a new sample.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: MetricKind,
        value: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            kind,
            source: source.into(),
        }
    }

    /// Creates a counter sample.
    #[must_use]
    pub fn counter(name: impl Into<String>, value: f64, source: impl Into<String>) -> Self {
        Self::new(name, MetricKind::Counter, value, source)
    }

    /// Creates a gauge sample.
    #[must_use]
    pub fn gauge(name: impl Into<String>, value: f64, source: impl Into<String>) -> Self {
        Self::new(name, MetricKind::Gauge, value, source)
    }

    /// Encodes the sample as `name,source=<src>,type=<kind> value=<v>`.
    ///
    /// Commas, spaces and `=` in the name or source are backslash-escaped.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "{},source={},type={} value={}",
            escape_key(&self.name),
            escape_key(&self.source),
            self.kind,
            self.value
        )
    }
}

fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Joins samples into a newline-separated payload, one line per sample.
#[must_use]
pub fn render_lines(samples: &[MetricSample]) -> String {
    samples
        .iter()
        .map(MetricSample::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}
