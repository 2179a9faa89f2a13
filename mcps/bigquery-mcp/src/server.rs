//! MCP server wiring for BigQuery
//!
//! The handler is written out by hand rather than with the tool router
//! macros: unknown tool names and malformed arguments must come back as
//! error results, which the generated router would reject at the protocol
//! level instead.

use std::sync::Arc;

use mcp_common::{async_trait, CallToolResult, EmbeddableMcp, JsonObject, McpError, Tool};
use rmcp::model::{
    CallToolRequestParam, ListToolsResult, PaginatedRequestParam, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::RoleServer;
use tracing::info;

use crate::auth::CredentialProvider;
use crate::config::ServerConfig;
use crate::dispatch::ToolDispatcher;
use crate::error::ServerError;
use crate::query::QueryService;
use crate::warehouse::{Connector, RestConnector, WarehouseClient};

const SERVER_NAME: &str = "bigquery";

#[derive(Clone)]
pub struct BigQueryMcpServer {
    dispatcher: Arc<ToolDispatcher>,
}

impl BigQueryMcpServer {
    /// Acquire credentials for the configured strategy and open the
    /// connection. Any failure here aborts startup.
    pub async fn connect(config: &ServerConfig) -> Result<Self, ServerError> {
        let provider = Arc::new(CredentialProvider::new(
            config.strategy.clone(),
            config.callback_timeout,
        )?);
        let connector = Arc::new(RestConnector::new(&config.api)?);
        Self::with_connector(config, provider, connector).await
    }

    pub async fn with_connector(
        config: &ServerConfig,
        provider: Arc<CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ServerError> {
        info!(
            project = %config.project,
            location = %config.location,
            strategy = %provider.strategy(),
            "Initializing BigQuery client"
        );

        let credential = provider.acquire().await?;
        let client = Arc::new(
            WarehouseClient::connect(
                connector,
                credential,
                config.project.as_str(),
                config.location.as_str(),
            )
            .await?,
        );
        let queries = QueryService::new(client.clone(), config.datasets.clone());

        Ok(Self {
            dispatcher: Arc::new(ToolDispatcher::new(queries, provider, client)),
        })
    }
}

impl rmcp::ServerHandler for BigQueryMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "BigQuery MCP server. Use execute-query to run SELECT statements in BigQuery \
                 standard SQL, list-tables to see dataset.table names, describe-table to get a \
                 table's DDL, and reauth-oauth to log in again when running with --oauth-flow."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.dispatcher.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .dispatcher
            .dispatch(&request.name, request.arguments)
            .await;
        Ok(result.into())
    }
}

#[async_trait]
impl EmbeddableMcp for BigQueryMcpServer {
    fn server_name(&self) -> &str {
        SERVER_NAME
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.dispatcher.tools()
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> CallToolResult {
        self.dispatcher.dispatch(name, arguments).await.into()
    }

    fn server_version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }
}
