//! Log shipping.
//!
//! `LogShipper` owns the buffer and the delivery sink. Call sites use
//! [`LogShipper::log`] or one of the convenience loggers; a background loop
//! flushes on a fixed period and whenever the buffer reaches its threshold.
//!
//! # Record lifecycle
//! ```text
//! log() → sanitize → buffer ─┬─ flush ok ──────→ shipped
//!                            └─ flush failed ──→ requeued at head
//! ```
//!
//! Every flush path takes the same async lock, so two flushes never overlap
//! and a record is never in two in-flight batches.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex, Notify};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::buffer::LogBuffer;
use super::stream::LogPush;
use crate::models::{
    LogLevel, LogRecord, CATEGORY_DATABASE, CATEGORY_EXCEPTION, CATEGORY_FACTORY, CATEGORY_HTTP,
};
use crate::sanitize::to_log_value;
use crate::transport::LogSink;

/// Result of a single flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No log endpoint is configured.
    Disabled,
    /// Nothing was buffered; no request was made.
    Empty,
    /// The batch was accepted.
    Shipped {
        /// Records delivered.
        records: usize,
    },
    /// Delivery failed and the batch was put back at the head of the buffer.
    Requeued {
        /// Records requeued.
        records: usize,
    },
    /// The final flush did not finish in time; the in-flight batch is lost.
    TimedOut,
}

/// Fields of an inbound HTTP request record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HttpRequestLog {
    /// Request method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Final response status.
    pub status: u16,
    /// Total handling time in milliseconds.
    pub duration_ms: f64,
    /// Client address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Authenticated user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether the request carried credentials.
    pub has_credentials: bool,
    /// Captured request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Captured response body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
}

/// Buffers records and ships them to the log backend.
pub struct LogShipper {
    buffer: LogBuffer,
    sink: Option<Arc<dyn LogSink>>,
    source: String,
    threshold: usize,
    period: Duration,
    flush_lock: AsyncMutex<()>,
    wake: Notify,
}

impl LogShipper {
    /// Creates a shipper. With `sink` set to `None` records are not buffered
    /// and every flush is a no-op.
    #[must_use]
    pub fn new(
        sink: Option<Arc<dyn LogSink>>,
        source: impl Into<String>,
        threshold: usize,
        period: Duration,
    ) -> Self {
        Self {
            buffer: LogBuffer::new(),
            sink,
            source: source.into(),
            threshold: threshold.max(1),
            period,
            flush_lock: AsyncMutex::new(()),
            wake: Notify::new(),
        }
    }

    /// Returns true if a destination is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Number of records waiting to be shipped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Copies the pending records, oldest first.
    #[must_use]
    pub fn pending_records(&self) -> Vec<LogRecord> {
        self.buffer.snapshot()
    }

    /// Records a structured log event.
    ///
    /// `fields` is redacted before the record is created. Reaching the flush
    /// threshold wakes the background loop; this call never waits on I/O.
    pub fn log(&self, level: LogLevel, category: &str, message: &str, fields: Value) {
        let record = LogRecord::new(level, category, message, fields);
        self.enqueue(record);
    }

    /// Buffers an already constructed record.
    pub fn enqueue(&self, record: LogRecord) {
        if !self.is_enabled() {
            tracing::debug!(
                level = %record.level(),
                category = record.category(),
                message = record.message(),
                "Log shipping disabled, record not buffered"
            );
            return;
        }

        if self.buffer.push(record) >= self.threshold {
            self.wake.notify_one();
        }
    }

    /// Logs an inbound HTTP request. 5xx is an error, 4xx a warning.
    pub fn log_http_request(&self, entry: &HttpRequestLog) {
        let message = format!("{} {} {}", entry.method, entry.path, entry.status);
        self.log(
            LogLevel::for_status(entry.status),
            CATEGORY_HTTP,
            &message,
            to_log_value(entry),
        );
    }

    /// Logs a database query and its outcome.
    pub fn log_database_query(
        &self,
        query: &str,
        params: &Value,
        duration_ms: f64,
        error: Option<&str>,
    ) {
        let (level, message) = match error {
            Some(_) => (LogLevel::Error, "Database query failed"),
            None => (LogLevel::Info, "Database query"),
        };
        self.log(
            level,
            CATEGORY_DATABASE,
            message,
            json!({
                "query": query,
                "params": params,
                "duration_ms": duration_ms,
                "error": error,
            }),
        );
    }

    /// Logs an outbound call to the factory service.
    pub fn log_factory_request(
        &self,
        request: &Value,
        response: Option<&Value>,
        status: Option<u16>,
        duration_ms: f64,
        error: Option<&str>,
    ) {
        let failed = error.is_some() || status.is_some_and(|s| s >= 400);
        let (level, message) = if failed {
            (LogLevel::Error, "Factory request failed")
        } else {
            (LogLevel::Info, "Factory request")
        };
        self.log(
            level,
            CATEGORY_FACTORY,
            message,
            json!({
                "request": request,
                "response": response,
                "status": status,
                "duration_ms": duration_ms,
                "error": error,
            }),
        );
    }

    /// Logs an unhandled error.
    pub fn log_exception(&self, message: &str, stack: Option<&str>) {
        self.log(
            LogLevel::Error,
            CATEGORY_EXCEPTION,
            message,
            json!({ "message": message, "stack": stack }),
        );
    }

    /// Ships everything currently buffered.
    ///
    /// The buffer is swapped for an empty one before delivery starts, so
    /// records logged during the request go to the next flush. On failure
    /// the batch is put back at the head of the buffer in its original order.
    pub async fn flush(&self) -> FlushOutcome {
        let Some(sink) = &self.sink else {
            return FlushOutcome::Disabled;
        };

        let _guard = self.flush_lock.lock().await;

        let batch = self.buffer.take_all();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let records = batch.len();

        let result = match LogPush::from_records(&batch, &self.source) {
            Ok(payload) => sink.push_streams(&payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::debug!(records, "Logs shipped");
                FlushOutcome::Shipped { records }
            }
            Err(e) => {
                tracing::warn!(error = %e, records, "Failed to ship logs, requeueing batch");
                self.buffer.requeue_front(batch);
                FlushOutcome::Requeued { records }
            }
        }
    }

    /// Flushes on a fixed period and on threshold wake-ups until `shutdown`
    /// fires.
    ///
    /// Returns immediately when no destination is configured.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.is_enabled() {
            tracing::info!("Log shipping disabled: no endpoint configured");
            return;
        }

        tracing::info!(
            interval_secs = self.period.as_secs(),
            threshold = self.threshold,
            "Log shipper starting"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                () = self.wake.notified() => {
                    tracing::debug!("Log buffer reached threshold");
                    self.flush().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Log shipper stopping");
                    break;
                }
            }
        }
    }
}
