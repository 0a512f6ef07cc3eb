//! Slicewatch CLI
//!
//! Operator commands for the Slicewatch telemetry pipeline.
//!
//! # Usage
//!
//! ```bash
//! slicewatch --help
//! slicewatch config
//! echo '{"password": "x"}' | slicewatch sanitize
//! ```

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use telemetry::config::{EndpointConfig, TelemetryConfig};
use telemetry::sanitize::sanitize;

/// Slicewatch CLI - telemetry pipeline operator tools
#[derive(Parser)]
#[command(name = "slicewatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective telemetry configuration with API keys masked
    Config {
        /// Print as JSON (API keys are omitted)
        #[arg(long)]
        json: bool,
    },
    /// Redact sensitive keys from a JSON document
    Sanitize {
        /// Read from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { json }) => {
            let config = TelemetryConfig::from_env().context("Invalid telemetry configuration")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", render_config(&config));
            }
        }
        Some(Commands::Sanitize { input, compact }) => {
            let raw = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            println!("{}", sanitize_document(&raw, compact)?);
        }
        None => {
            println!("Slicewatch CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

/// Human-readable configuration summary.
fn render_config(config: &TelemetryConfig) -> String {
    let mut out = format!(
        "source:              {}\n\
         counter mode:        {:?}\n\
         metrics interval:    {}s\n\
         logs interval:       {}s\n\
         log flush threshold: {}\n\
         request timeout:     {}s\n",
        config.source,
        config.counter_mode,
        config.metrics_interval_secs,
        config.logs_interval_secs,
        config.log_flush_threshold,
        config.request_timeout_secs,
    );
    out.push_str(&render_endpoint("metrics", config.metrics.as_ref()));
    out.push_str(&render_endpoint("logs", config.logs.as_ref()));
    out
}

fn render_endpoint(name: &str, endpoint: Option<&EndpointConfig>) -> String {
    match endpoint {
        Some(e) => format!(
            "{name:<8} endpoint:    {} (user {}, key {})\n",
            e.url,
            e.user_id,
            e.masked_api_key()
        ),
        None => format!("{name:<8} endpoint:    disabled\n"),
    }
}

/// Parses `raw` as JSON and returns the redacted document.
fn sanitize_document(raw: &str, compact: bool) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Input is not valid JSON")?;
    let clean = sanitize(&value);
    let rendered = if compact {
        serde_json::to_string(&clean)?
    } else {
        serde_json::to_string_pretty(&clean)?
    };
    Ok(rendered)
}
