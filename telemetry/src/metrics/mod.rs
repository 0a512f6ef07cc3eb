//! Metric aggregation and export.
//!
//! # Data Flow
//! ```text
//! request path
//!     → aggregator.rs (counters, active users, latency windows)
//! every metrics_interval:
//!     → exporter.rs (snapshot_and_reset + system.rs gauges)
//!     → line payload → MetricsSink
//! ```

pub mod aggregator;
pub mod exporter;
pub mod system;

pub use aggregator::{MetricsAggregator, MetricsSnapshot, TrackedMethod};
pub use exporter::{ExportOutcome, MetricsExporter};
pub use system::{FixedSystemProbe, NoSystemProbe, SysinfoProbe, SystemProbe, SystemUsage};
