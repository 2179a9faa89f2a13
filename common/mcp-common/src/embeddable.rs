//! Embeddable MCP trait for in-process execution
//!
//! This module provides the [`EmbeddableMcp`] trait that allows MCP servers
//! to be driven directly in-process, without a stdio transport in between.
//! Hosts and tests use it to call tools exactly as the transport would.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::EmbeddableMcp;
//!
//! let tools = server.list_tools();
//! println!("Available: {:?}", tools.iter().map(|t| &t.name).collect::<Vec<_>>());
//!
//! let result = server
//!     .call_tool_json("describe-table", serde_json::json!({"table_name": "sales.orders"}))
//!     .await?;
//! ```

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde_json::Value;

/// Error type for embeddable MCP operations
///
/// Tool failures are not errors here: they come back as a `CallToolResult`
/// with `is_error` set. Only malformed calls are rejected.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    /// Tool arguments were not a JSON object
    #[error("invalid parameters: expected a JSON object, got {0}")]
    InvalidParams(&'static str),
}

/// Result type for embeddable MCP operations
pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// Trait for MCP servers that can be executed in-process
///
/// Implementations must be `Send + Sync` to support tool calls from multiple
/// async tasks.
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Returns the server name for identification
    fn server_name(&self) -> &str;

    /// Returns a list of all available tools with their input schemas
    fn list_tools(&self) -> Vec<Tool>;

    /// Executes a tool by name
    ///
    /// Unknown tools, invalid arguments and execution failures are all
    /// reported inside the returned result.
    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> CallToolResult;

    /// Executes a tool with arguments given as an arbitrary JSON value
    ///
    /// `null` means "no arguments"; anything other than an object is rejected.
    async fn call_tool_json(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        let arguments = match params {
            Value::Null => None,
            Value::Object(map) => Some(map),
            Value::Bool(_) => return Err(EmbeddableError::InvalidParams("a boolean")),
            Value::Number(_) => return Err(EmbeddableError::InvalidParams("a number")),
            Value::String(_) => return Err(EmbeddableError::InvalidParams("a string")),
            Value::Array(_) => return Err(EmbeddableError::InvalidParams("an array")),
        };
        Ok(self.call_tool(name, arguments).await)
    }

    /// Returns the server version, if available
    fn server_version(&self) -> Option<&str> {
        None
    }
}
