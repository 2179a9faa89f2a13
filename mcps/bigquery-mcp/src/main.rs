//! BigQuery MCP Server
//!
//! Serves execute-query, list-tables, describe-table and reauth-oauth over
//! stdio.
//!
//! # Configuration
//! `--project`/`BIGQUERY_PROJECT` and `--location`/`BIGQUERY_LOCATION` are
//! required; see `bigquery-mcp --help` or `~/.binks/bigquery.toml`.

use bigquery_mcp::{BigQueryMcpServer, ServerConfig};
use rmcp::{transport::stdio, ServiceExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    mcp_common::init_tracing("bigquery_mcp", config.log_file.as_deref())?;

    tracing::info!(
        project = %config.project,
        location = %config.location,
        strategy = %config.strategy,
        datasets = ?config.datasets,
        "Starting BigQuery MCP Server"
    );
    if let Some(path) = &config.config_file {
        tracing::info!("Loaded config from: {}", path.display());
    }

    let server = BigQueryMcpServer::connect(&config).await?;
    let service = server.serve(stdio()).await?;

    tracing::info!("Server running with stdio transport");
    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
