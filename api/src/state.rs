//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers and
//! to the instrumentation hook.

use std::sync::Arc;
use telemetry::{Telemetry, TelemetryConfig};

use crate::config::InstrumentationConfig;

/// Application state shared across all request handlers.
///
/// Holds the process-wide telemetry pipeline. Handlers that talk to a
/// database or to the factory service reach the convenience loggers through
/// [`AppState::telemetry`].
#[derive(Clone)]
pub struct AppState {
    telemetry: Arc<Telemetry>,
    instrumentation: Arc<InstrumentationConfig>,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(telemetry: Arc<Telemetry>, instrumentation: InstrumentationConfig) -> Self {
        Self {
            telemetry,
            instrumentation: Arc::new(instrumentation),
        }
    }

    /// Creates a state whose pipeline has no destinations and no host gauges.
    ///
    /// Metrics still aggregate and log calls are accepted, but nothing is
    /// shipped. Useful for development and testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the default telemetry configuration is rejected.
    pub fn detached() -> Result<Self, telemetry::TelemetryError> {
        let telemetry = Telemetry::builder(TelemetryConfig::default())
            .without_system_probe()
            .build()?;
        Ok(Self::new(
            Arc::new(telemetry),
            InstrumentationConfig::default(),
        ))
    }

    /// Returns the telemetry pipeline.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Returns the instrumentation settings.
    #[must_use]
    pub fn instrumentation(&self) -> &InstrumentationConfig {
        &self.instrumentation
    }
}
