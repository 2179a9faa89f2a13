//! BigQuery MCP Server Library
//!
//! Read-only BigQuery access over MCP: run SELECT queries, list tables and
//! fetch table DDL. Credentials come from a service-account key file, the
//! ambient application default credentials, or an interactive browser login
//! whose tokens are persisted and can be renewed without a restart.
//!
//! # Example
//!
//! ```rust,ignore
//! use bigquery_mcp::{BigQueryMcpServer, ServerConfig};
//! use mcp_common::EmbeddableMcp;
//!
//! let config = ServerConfig::load()?;
//! let server = BigQueryMcpServer::connect(&config).await?;
//! let result = server
//!     .call_tool_json("list-tables", serde_json::Value::Null)
//!     .await?;
//! ```

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod params;
pub mod query;
pub mod server;
pub mod warehouse;

#[cfg(test)]
mod testing;

pub use config::ServerConfig;
pub use server::BigQueryMcpServer;
