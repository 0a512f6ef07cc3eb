//! Data models for the telemetry pipeline.
//!
//! This module contains the core data structures that flow through the pipeline:
//! - [`LogRecord`] - Structured, redacted log records
//! - [`MetricSample`] - Counter and gauge samples produced by a snapshot

pub mod log;
pub mod metric;

pub use log::{
    LogLevel, LogRecord, CATEGORY_DATABASE, CATEGORY_EXCEPTION, CATEGORY_FACTORY, CATEGORY_HTTP,
};
pub use metric::{render_lines, MetricKind, MetricSample};
