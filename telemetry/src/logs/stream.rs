//! Grouping of records into labeled streams.
//!
//! A push carries one stream per distinct `{level, type, source}` label set,
//! in the order each label set first appears in the batch. Each value is a
//! `[<unix-nanos>, <json-encoded record>]` pair.

use serde::Serialize;
use std::collections::HashMap;

use crate::models::{LogLevel, LogRecord};
use crate::transport::DeliveryError;

/// Label set identifying a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StreamLabels {
    /// Record level.
    pub level: LogLevel,
    /// Record category.
    #[serde(rename = "type")]
    pub category: String,
    /// Emitting service.
    pub source: String,
}

/// One labeled stream of timestamped, encoded records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogStream {
    /// Stream labels.
    pub stream: StreamLabels,
    /// `(nanosecond timestamp, encoded record)` pairs in batch order.
    pub values: Vec<(String, String)>,
}

/// Body of a log push request.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use telemetry::logs::LogPush;
/// use telemetry::models::{LogLevel, LogRecord};
///
/// let records = vec![
///     LogRecord::new(LogLevel::Info, "http", "GET /", json!({})),
///     LogRecord::new(LogLevel::Error, "database", "timeout", json!({})),
///     LogRecord::new(LogLevel::Info, "http", "GET /menu", json!({})),
/// ];
///
/// let push = LogPush::from_records(&records, "pizza-service").unwrap();
/// assert_eq!(push.streams.len(), 2);
/// assert_eq!(push.streams[0].values.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPush {
    /// Streams ordered by first appearance of their labels.
    pub streams: Vec<LogStream>,
}

impl LogPush {
    /// Groups `records` into streams labeled with `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded as JSON.
    pub fn from_records(records: &[LogRecord], source: &str) -> Result<Self, DeliveryError> {
        let mut streams: Vec<LogStream> = Vec::new();
        let mut index: HashMap<StreamLabels, usize> = HashMap::new();

        for record in records {
            let labels = StreamLabels {
                level: record.level(),
                category: record.category().to_string(),
                source: source.to_string(),
            };
            let value = (record.unix_nanos_string(), serde_json::to_string(record)?);

            if let Some(&position) = index.get(&labels) {
                streams[position].values.push(value);
            } else {
                index.insert(labels.clone(), streams.len());
                streams.push(LogStream {
                    stream: labels,
                    values: vec![value],
                });
            }
        }

        Ok(Self { streams })
    }

    /// Total number of records across all streams.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.streams.iter().map(|s| s.values.len()).sum()
    }
}
