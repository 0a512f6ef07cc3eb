//! Slicewatch API Server
//!
//! Hosts an axum service wrapped with the Slicewatch request instrumentation
//! hook and owns the telemetry pipeline for the lifetime of the process.
//!
//! # Architecture
//!
//! - [`instrument`] wraps any router with the per-request hook
//! - The telemetry pipeline's export and flush loops run in the background
//! - On SIGTERM/SIGINT the server drains connections, stops the loops and
//!   makes one bounded attempt to ship buffered logs
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod instrument;
pub mod routes;
mod state;

pub use config::{Config, InstrumentationConfig, DEFAULT_AUTH_PATH, DEFAULT_MAX_CAPTURE_BYTES};
pub use instrument::{instrument_request, AuthenticatedUser};
pub use state::AppState;

use anyhow::Result;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use telemetry::Telemetry;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Runs the Slicewatch API server.
///
/// This function initializes the server with configuration from environment variables
/// and starts listening for incoming connections. It handles graceful shutdown on
/// SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    run_server_with_config(config).await
}

/// Runs the Slicewatch API server with the provided configuration.
///
/// # Errors
///
/// Returns an error if:
/// - The telemetry pipeline cannot be built
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        source = %config.telemetry.source,
        "Slicewatch API server starting"
    );

    let telemetry = Arc::new(Telemetry::from_config(config.telemetry)?);
    telemetry.start();

    let state = AppState::new(Arc::clone(&telemetry), config.instrumentation);
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    // Flush even when serving failed.
    let outcome = telemetry.shutdown().await;
    tracing::info!(?outcome, "Server shutdown complete");

    served?;
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    instrument(routes::health_routes(state.clone()), state)
}

/// Wraps `router` with the request instrumentation hook and HTTP tracing.
///
/// Every request reaching `router` is counted, timed and logged through the
/// pipeline held by `state`.
pub fn instrument(router: Router, state: AppState) -> Router {
    router
        .layer(middleware::from_fn_with_state(state, instrument_request))
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
