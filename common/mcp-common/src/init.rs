//! Server initialization utilities
//!
//! Installs the process-wide tracing subscriber. MCP servers speak the
//! protocol on stdout, so every log line goes to stderr and, optionally, to
//! an append-only log file.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize tracing/logging for an MCP server
///
/// Sets up logging with:
/// - stderr output without ANSI colors (stdout is reserved for MCP frames)
/// - Environment-based filtering via RUST_LOG
/// - Default log level of `info` for the specified crate
/// - An optional second sink appending to `log_file`
///
/// Set `LOG_FORMAT=json` for structured JSON output on both sinks.
///
/// Must be called once, at startup, before any component logs.
///
/// # Example
///
/// ```rust,ignore
/// mcp_common::init_tracing("bigquery_mcp", None)?;
/// ```
pub fn init_tracing(crate_name: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let stderr_layer = if use_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .boxed()
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false);
            Some(if use_json { layer.json().boxed() } else { layer.boxed() })
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Tracing subscriber already installed")?;

    Ok(())
}
