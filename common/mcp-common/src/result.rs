//! Result helpers for MCP tool responses
//!
//! Tools in this workspace always answer with a single text block. Failures
//! are reported inside the tool result (with `is_error` set) so the calling
//! agent gets something it can reason about instead of a protocol fault.

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Render serializable data as pretty-printed JSON text
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::json_text;
///
/// let text = json_text(&vec!["sales.orders", "sales.customers"])?;
/// ```
pub fn json_text<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Create a successful plain text response
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::text_success;
///
/// fn my_tool(&self) -> CallToolResult {
///     text_success("Operation completed successfully")
/// }
/// ```
pub fn text_success(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Create a tool-level error response carrying a single text block
///
/// The response is still a successful reply at the transport level.
pub fn text_error(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_json_text() {
        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };
        let text = json_text(&data).unwrap();
        assert!(text.contains("\"name\": \"test\""));
        assert!(text.contains("\"value\": 42"));
    }

    #[test]
    fn test_text_success() {
        let result = text_success("hello world");
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn test_text_error() {
        let result = text_error("Error: boom");
        assert!(result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);
    }
}
