//! MCP Common - Shared utilities for MCP servers
//!
//! This crate provides common functionality used across the MCP servers in
//! this workspace:
//!
//! - **Initialization**: [`init_tracing`] for process-wide logging setup
//! - **Results**: helpers for single-text-block `CallToolResult` responses
//! - **Embeddable**: [`EmbeddableMcp`] trait for in-process execution
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{init_tracing, text_error, text_success};
//!
//! init_tracing("bigquery_mcp", None)?;
//!
//! let ok = text_success("[]");
//! let failed = text_error("Error: Unknown tool: drop-table");
//! ```

pub mod embeddable;
pub mod init;
pub mod result;

// Re-export commonly used items at crate root
pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use init::init_tracing;
pub use result::{json_text, text_error, text_success};

// Re-export rmcp types that are commonly needed
pub use rmcp::{
    model::{CallToolResult, Content, JsonObject, Tool},
    ErrorData as McpError,
};

// Re-export async_trait for implementing EmbeddableMcp
pub use async_trait::async_trait;
