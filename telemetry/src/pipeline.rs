//! Pipeline lifecycle.
//!
//! [`Telemetry`] owns the aggregator, the exporter and the shipper for the
//! lifetime of the process. Handles are shared with the request path through
//! [`Telemetry::metrics`] and [`Telemetry::logs`]; nothing else reads or
//! drains them.
//!
//! # Lifecycle
//! ```text
//! build → start (spawns export + flush loops) → shutdown
//!                                                 ├─ stop both loops
//!                                                 └─ one final log flush
//!                                                    (both under one deadline)
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::config::{ConfigError, TelemetryConfig};
use crate::logs::{FlushOutcome, LogShipper};
use crate::metrics::{MetricsAggregator, MetricsExporter, NoSystemProbe, SysinfoProbe, SystemProbe};
use crate::transport::{build_client, HttpLogSink, HttpMetricsSink, LogSink, MetricsSink};

/// Errors raised while constructing the pipeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configuration is invalid.
    #[error("Invalid telemetry configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Assembles a [`Telemetry`] with custom sinks or probes.
///
/// Sinks left unset are derived from the configuration: an HTTP sink when the
/// endpoint is configured, none otherwise.
pub struct TelemetryBuilder {
    config: TelemetryConfig,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    log_sink: Option<Arc<dyn LogSink>>,
    probe: Option<Arc<dyn SystemProbe>>,
}

impl TelemetryBuilder {
    /// Starts a builder from `config`.
    #[must_use]
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            metrics_sink: None,
            log_sink: None,
            probe: None,
        }
    }

    /// Uses `sink` for metric export regardless of the configured endpoint.
    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    /// Uses `sink` for log shipping regardless of the configured endpoint.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Uses `probe` for host gauges instead of `sysinfo`.
    #[must_use]
    pub fn with_system_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Disables host gauges.
    #[must_use]
    pub fn without_system_probe(self) -> Self {
        self.with_system_probe(Arc::new(NoSystemProbe))
    }

    /// Validates the configuration and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn build(self) -> Result<Telemetry, TelemetryError> {
        let config = self.config;
        config.validate_config()?;

        let needs_client = (self.metrics_sink.is_none() && config.metrics.is_some())
            || (self.log_sink.is_none() && config.logs.is_some());
        let client = if needs_client {
            Some(build_client(config.request_timeout())?)
        } else {
            None
        };

        let metrics_sink = self.metrics_sink.or_else(|| {
            let endpoint = config.metrics.clone()?;
            let client = client.clone()?;
            Some(Arc::new(HttpMetricsSink::new(client, endpoint)) as Arc<dyn MetricsSink>)
        });
        let log_sink = self.log_sink.or_else(|| {
            let endpoint = config.logs.clone()?;
            let client = client.clone()?;
            Some(Arc::new(HttpLogSink::new(client, endpoint)) as Arc<dyn LogSink>)
        });
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SysinfoProbe::new()) as Arc<dyn SystemProbe>);

        let aggregator = Arc::new(MetricsAggregator::new(config.counter_mode));
        let exporter = Arc::new(MetricsExporter::new(
            Arc::clone(&aggregator),
            metrics_sink,
            probe,
            config.source.clone(),
            config.metrics_interval(),
        ));
        let shipper = Arc::new(LogShipper::new(
            log_sink,
            config.source.clone(),
            config.log_flush_threshold,
            config.logs_interval(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Telemetry {
            aggregator,
            exporter,
            shipper,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            final_flush_timeout: config.shutdown_flush_timeout(),
        })
    }
}

/// The running telemetry pipeline.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use telemetry::config::TelemetryConfig;
/// use telemetry::models::LogLevel;
/// use telemetry::Telemetry;
///
/// # tokio_test::block_on(async {
/// let telemetry = Telemetry::builder(TelemetryConfig::new("pizza-service"))
///     .without_system_probe()
///     .build()
///     .unwrap();
/// telemetry.start();
///
/// telemetry.metrics().record_request("GET");
/// telemetry.logs().log(LogLevel::Info, "http", "GET /", json!({}));
///
/// telemetry.shutdown().await;
/// # });
/// ```
pub struct Telemetry {
    aggregator: Arc<MetricsAggregator>,
    exporter: Arc<MetricsExporter>,
    shipper: Arc<LogShipper>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    final_flush_timeout: Duration,
}

impl Telemetry {
    /// Starts a builder from `config`.
    #[must_use]
    pub fn builder(config: TelemetryConfig) -> TelemetryBuilder {
        TelemetryBuilder::new(config)
    }

    /// Builds a pipeline with HTTP sinks and `sysinfo` host gauges.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn from_config(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        TelemetryBuilder::new(config).build()
    }

    /// The shared metric aggregator.
    #[must_use]
    pub fn metrics(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    /// The shared log shipper.
    #[must_use]
    pub fn logs(&self) -> &LogShipper {
        &self.shipper
    }

    /// The metric exporter, for manual exports.
    #[must_use]
    pub fn exporter(&self) -> &MetricsExporter {
        &self.exporter
    }

    /// Spawns the export and flush loops on the current runtime.
    ///
    /// Calling this again while the loops are running has no effect.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }

        tasks.push(tokio::spawn(
            Arc::clone(&self.exporter).run(self.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.shipper).run(self.shutdown_tx.subscribe()),
        ));

        tracing::info!(
            metrics_enabled = self.exporter.is_enabled(),
            logs_enabled = self.shipper.is_enabled(),
            "Telemetry pipeline started"
        );
    }

    /// Stops both loops and makes one bounded attempt to ship buffered logs.
    ///
    /// Joining the loops and the final flush share one deadline of
    /// `shutdown_flush_timeout_secs`. A loop still busy in a push when the
    /// deadline passes is aborted, and the batch it was sending is lost.
    pub async fn shutdown(&self) -> FlushOutcome {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let deadline = Instant::now() + self.final_flush_timeout;

        // No receivers is fine: the loops were never started or already exited.
        let _ = self.shutdown_tx.send(());

        for mut task in tasks {
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Telemetry task ended abnormally"),
                Err(_) => {
                    tracing::warn!("Telemetry task still busy at shutdown deadline, aborting");
                    task.abort();
                }
            }
        }

        let outcome = match timeout_at(deadline, self.shipper.flush()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.final_flush_timeout.as_secs(),
                    "Final log flush timed out"
                );
                FlushOutcome::TimedOut
            }
        };

        tracing::info!(?outcome, "Telemetry pipeline stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::logs::LogPush;
    use crate::metrics::{ExportOutcome, FixedSystemProbe, SystemUsage};
    use crate::models::LogLevel;
    use crate::transport::DeliveryError;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Default)]
    struct CapturingLogSink {
        pushes: Mutex<Vec<LogPush>>,
    }

    #[async_trait]
    impl LogSink for CapturingLogSink {
        async fn push_streams(&self, payload: &LogPush) -> Result<(), DeliveryError> {
            self.pushes.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CapturingMetricsSink {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetricsSink for CapturingMetricsSink {
        async fn push_lines(&self, payload: String) -> Result<(), DeliveryError> {
            self.payloads.lock().unwrap().push(payload);
            Ok(())
        }
    }

    /// Sink that never answers.
    struct StalledLogSink;

    #[async_trait]
    impl LogSink for StalledLogSink {
        async fn push_streams(&self, _payload: &LogPush) -> Result<(), DeliveryError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unconfigured_pipeline_is_inert() {
        let telemetry = Telemetry::builder(TelemetryConfig::new("svc"))
            .without_system_probe()
            .build()
            .unwrap();
        telemetry.start();

        telemetry.metrics().record_request("GET");
        telemetry
            .logs()
            .log(LogLevel::Info, "http", "GET /", json!({}));

        assert_eq!(telemetry.exporter().export().await, ExportOutcome::Disabled);
        assert_eq!(telemetry.shutdown().await, FlushOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_from_config_with_endpoints() {
        let config = TelemetryConfig::new("svc")
            .with_metrics(EndpointConfig::new("http://127.0.0.1:9/metrics", "1", "k"))
            .with_logs(EndpointConfig::new("http://127.0.0.1:9/logs", "2", "k"));

        let telemetry = Telemetry::from_config(config).unwrap();

        assert!(telemetry.exporter().is_enabled());
        assert!(telemetry.logs().is_enabled());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = TelemetryConfig::new("");
        assert!(matches!(
            Telemetry::from_config(config),
            Err(TelemetryError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffered_logs() {
        let sink = Arc::new(CapturingLogSink::default());
        let telemetry = Telemetry::builder(TelemetryConfig::new("svc"))
            .with_log_sink(Arc::clone(&sink) as Arc<dyn LogSink>)
            .without_system_probe()
            .build()
            .unwrap();
        telemetry.start();

        telemetry
            .logs()
            .log(LogLevel::Warn, "http", "GET /missing 404", json!({}));
        telemetry.logs().log_exception("boom", None);

        assert_eq!(
            telemetry.shutdown().await,
            FlushOutcome::Shipped { records: 2 }
        );
        let pushes = sink.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].streams.len(), 2);
        assert_eq!(pushes[0].streams[0].stream.source, "svc");
    }

    #[tokio::test]
    async fn test_shutdown_flush_is_bounded() {
        let mut config = TelemetryConfig::new("svc");
        config.shutdown_flush_timeout_secs = 1;
        let telemetry = Telemetry::builder(config)
            .with_log_sink(Arc::new(StalledLogSink))
            .without_system_probe()
            .build()
            .unwrap();

        telemetry.logs().log(LogLevel::Info, "http", "stuck", json!({}));

        let outcome = tokio::time::timeout(Duration::from_secs(5), telemetry.shutdown())
            .await
            .unwrap();
        assert_eq!(outcome, FlushOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded_while_loop_push_stalls() {
        let mut config = TelemetryConfig::new("svc");
        config.shutdown_flush_timeout_secs = 1;
        config.log_flush_threshold = 1;
        let telemetry = Telemetry::builder(config)
            .with_log_sink(Arc::new(StalledLogSink))
            .without_system_probe()
            .build()
            .unwrap();
        telemetry.start();

        // The threshold wakes the flush loop, which then hangs in the push.
        telemetry.logs().log(LogLevel::Info, "http", "stuck", json!({}));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(telemetry.logs().pending(), 0);

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(Duration::from_secs(5), telemetry.shutdown())
            .await
            .expect("shutdown must finish within its deadline");

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(outcome, FlushOutcome::TimedOut | FlushOutcome::Empty));
    }

    #[tokio::test]
    async fn test_manual_export_uses_probe_and_source() {
        let sink = Arc::new(CapturingMetricsSink::default());
        let telemetry = Telemetry::builder(TelemetryConfig::new("pizza"))
            .with_metrics_sink(Arc::clone(&sink) as Arc<dyn MetricsSink>)
            .with_system_probe(Arc::new(FixedSystemProbe(SystemUsage {
                cpu_percent: 12.5,
                memory_percent: 40.0,
            })))
            .build()
            .unwrap();

        telemetry.metrics().track_active_user(Some("u1"));

        assert_eq!(
            telemetry.exporter().export().await,
            ExportOutcome::Delivered { samples: 3 }
        );
        let payloads = sink.payloads.lock().unwrap();
        assert!(payloads[0].contains("active_users,source=pizza,type=gauge value=1"));
        assert!(payloads[0].contains("cpu_usage_percent,source=pizza,type=gauge value=12.5"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let telemetry = Telemetry::builder(TelemetryConfig::new("svc"))
            .with_log_sink(Arc::new(CapturingLogSink::default()))
            .without_system_probe()
            .build()
            .unwrap();

        telemetry.start();
        telemetry.start();

        assert_eq!(telemetry.tasks.lock().unwrap().len(), 2);
        telemetry.shutdown().await;
    }
}
