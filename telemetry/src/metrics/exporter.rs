//! Periodic metric export.
//!
//! On every tick the exporter snapshots the aggregator, attaches host gauges,
//! renders one line per sample and pushes the payload. A failed push is
//! logged and dropped: metrics are not re-queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::aggregator::MetricsAggregator;
use super::system::SystemProbe;
use crate::models::render_lines;
use crate::transport::MetricsSink;

/// Result of a single export attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No metrics endpoint is configured; nothing was read.
    Disabled,
    /// The snapshot contained no samples; no request was made.
    Empty,
    /// The payload was accepted.
    Delivered {
        /// Number of lines sent.
        samples: usize,
    },
    /// The push failed and the samples were dropped.
    Failed {
        /// Number of lines lost.
        samples: usize,
    },
}

/// Drains the aggregator into the metrics backend.
pub struct MetricsExporter {
    aggregator: Arc<MetricsAggregator>,
    sink: Option<Arc<dyn MetricsSink>>,
    probe: Arc<dyn SystemProbe>,
    source: String,
    period: Duration,
}

impl MetricsExporter {
    /// Creates an exporter. With `sink` set to `None` every export is a no-op.
    #[must_use]
    pub fn new(
        aggregator: Arc<MetricsAggregator>,
        sink: Option<Arc<dyn MetricsSink>>,
        probe: Arc<dyn SystemProbe>,
        source: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            aggregator,
            sink,
            probe,
            source: source.into(),
            period,
        }
    }

    /// Returns true if a destination is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Snapshots, renders and pushes once.
    pub async fn export(&self) -> ExportOutcome {
        let Some(sink) = &self.sink else {
            return ExportOutcome::Disabled;
        };

        let mut snapshot = self.aggregator.snapshot_and_reset();
        if let Some(usage) = self.probe.sample() {
            snapshot.cpu_percent = Some(usage.cpu_percent);
            snapshot.memory_percent = Some(usage.memory_percent);
        }

        let samples = snapshot.to_samples(&self.source);
        if samples.is_empty() {
            return ExportOutcome::Empty;
        }

        let count = samples.len();
        match sink.push_lines(render_lines(&samples)).await {
            Ok(()) => {
                tracing::debug!(samples = count, "Metrics exported");
                ExportOutcome::Delivered { samples: count }
            }
            Err(e) => {
                tracing::warn!(error = %e, samples = count, "Failed to export metrics");
                ExportOutcome::Failed { samples: count }
            }
        }
    }

    /// Exports on a fixed period until `shutdown` fires.
    ///
    /// Returns immediately when no destination is configured.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.is_enabled() {
            tracing::info!("Metrics export disabled: no endpoint configured");
            return;
        }

        tracing::info!(interval_secs = self.period.as_secs(), "Metrics exporter starting");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.export().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Metrics exporter stopping");
                    break;
                }
            }
        }
    }
}
