//! Tool dispatch
//!
//! Maps a tool name plus JSON arguments onto the query service or the
//! credential provider. Every outcome, including unknown tools and bad
//! arguments, becomes a single text block: failures are returned as tool
//! results flagged `is_error`, never as protocol errors.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mcp_common::{json_text, text_error, text_success, CallToolResult, JsonObject, Tool};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::CredentialProvider;
use crate::error::{DispatchError, ToolError};
use crate::params::{input_schema, DescribeTableParams, EmptyParams, QueryParams};
use crate::query::QueryService;
use crate::warehouse::WarehouseClient;

pub const REAUTH_SUCCESS: &str =
    "✅ OAuth re-authentication successful! You are now connected with fresh credentials.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ExecuteQuery,
    ListTables,
    DescribeTable,
    ReauthOauth,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::ExecuteQuery,
        ToolName::ListTables,
        ToolName::DescribeTable,
        ToolName::ReauthOauth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ExecuteQuery => "execute-query",
            ToolName::ListTables => "list-tables",
            ToolName::DescribeTable => "describe-table",
            ToolName::ReauthOauth => "reauth-oauth",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ToolName::ExecuteQuery => "Execute a SELECT query on the BigQuery database",
            ToolName::ListTables => "List all tables in the BigQuery database",
            ToolName::DescribeTable => "Get the schema information for a specific table",
            ToolName::ReauthOauth => {
                "Re-authenticate using OAuth flow with fresh credentials. This will open your \
                 browser for authentication and is useful for switching Google accounts or \
                 refreshing permissions. Only available when using --oauth-flow."
            }
        }
    }

    fn tool(&self) -> Tool {
        let schema = match self {
            ToolName::ExecuteQuery => input_schema::<QueryParams>(),
            ToolName::DescribeTable => input_schema::<DescribeTableParams>(),
            ToolName::ListTables | ToolName::ReauthOauth => input_schema::<EmptyParams>(),
        };
        Tool::new(self.as_str(), self.description(), schema)
    }
}

impl FromStr for ToolName {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownTool(s.to_string()))
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tool invocation; exactly one text payload either way
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Success(String),
    Failure(String),
}

impl ToolResult {
    pub fn text(&self) -> &str {
        match self {
            ToolResult::Success(text) | ToolResult::Failure(text) => text,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ToolResult::Failure(_))
    }
}

impl From<ToolResult> for CallToolResult {
    fn from(result: ToolResult) -> Self {
        match result {
            ToolResult::Success(text) => text_success(text),
            ToolResult::Failure(text) => text_error(text),
        }
    }
}

pub struct ToolDispatcher {
    queries: QueryService,
    provider: Arc<CredentialProvider>,
    client: Arc<WarehouseClient>,
}

impl ToolDispatcher {
    pub fn new(
        queries: QueryService,
        provider: Arc<CredentialProvider>,
        client: Arc<WarehouseClient>,
    ) -> Self {
        Self {
            queries,
            provider,
            client,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        ToolName::ALL.iter().map(ToolName::tool).collect()
    }

    pub async fn dispatch(&self, name: &str, arguments: Option<JsonObject>) -> ToolResult {
        match self.try_dispatch(name, arguments.as_ref()).await {
            Ok(text) => ToolResult::Success(text),
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                ToolResult::Failure(format!("Error: {e}"))
            }
        }
    }

    async fn try_dispatch(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<String, ToolError> {
        let tool: ToolName = name.parse()?;
        info!(%tool, "Handling tool call");

        match tool {
            ToolName::ExecuteQuery => {
                let query = required_str(arguments, "query")?;
                let rows = self.queries.execute_query(query, &[]).await?;
                Ok(json_text(&rows)?)
            }
            ToolName::ListTables => {
                let tables = self.queries.list_tables().await?;
                Ok(json_text(&tables)?)
            }
            ToolName::DescribeTable => {
                let table_name = required_str(arguments, "table_name")?;
                let rows = self.queries.describe_table(table_name).await?;
                Ok(json_text(&rows)?)
            }
            ToolName::ReauthOauth => {
                self.provider.reauthenticate(&self.client).await?;
                Ok(REAUTH_SUCCESS.to_string())
            }
        }
    }
}

/// A required string argument; absent and `null` both count as missing
fn required_str<'a>(
    arguments: Option<&'a JsonObject>,
    name: &'static str,
) -> Result<&'a str, DispatchError> {
    match arguments.and_then(|args| args.get(name)) {
        None | Some(Value::Null) => Err(DispatchError::MissingArgument(name)),
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(DispatchError::InvalidArgument {
            name,
            reason: format!("expected a string, got {}", json_type(other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
