//! Slicewatch Telemetry Library
//!
//! In-process metrics and structured logs for an HTTP service, shipped
//! asynchronously to a metrics time-series backend and a log-aggregation
//! backend. Delivery never blocks request handling and never surfaces an
//! error to the instrumented service.
//!
//! # Modules
//!
//! - [`sanitize`] - Redaction of sensitive keys in structured values
//! - [`metrics`] - Counter/gauge aggregation and periodic export
//! - [`logs`] - Log buffering, stream grouping and shipping with requeue
//! - [`transport`] - HTTP delivery sinks
//! - [`pipeline`] - Construction, background loops and shutdown
//! - [`config`] - Endpoints, cadences and environment loading
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use telemetry::sanitize::sanitize;
//!
//! let clean = sanitize(&json!({"email": "a@b.c", "password": "hunter2"}));
//!
//! assert_eq!(clean, json!({"email": "a@b.c", "password": "***REDACTED***"}));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod logs;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sanitize;
pub mod transport;

pub use config::{CounterMode, EndpointConfig, TelemetryConfig};
pub use pipeline::{Telemetry, TelemetryBuilder, TelemetryError};

/// Re-export common dependencies for convenience.
pub use serde_json;
