//! Error types for the BigQuery MCP server
//!
//! Each layer has its own enum. Everything raised while serving a single tool
//! call funnels into [`ToolError`] and is rendered as text by the dispatcher.

use std::path::PathBuf;

use thiserror::Error;

/// Credential acquisition and re-authentication failures
#[derive(Error, Debug)]
pub enum AuthError {
    /// The service-account key file could not be read or parsed
    #[error("Invalid key file {}: {reason}", path.display())]
    InvalidKeyFile { path: PathBuf, reason: String },

    /// Ambient credential discovery found nothing usable
    #[error("No default credentials found: {0}")]
    NoDefaultCredentials(String),

    /// Client secrets are neither a readable file nor inline JSON
    #[error("OAuth flow requires client secrets: {0}")]
    MissingClientSecrets(String),

    /// Re-authentication was requested under a non-interactive strategy
    #[error("OAuth re-authentication is only available when using --oauth-flow")]
    NotInteractive,

    /// A fresh interactive credential could not be obtained or verified
    #[error("OAuth re-authentication failed: {0}")]
    ReauthFailed(String),

    /// The refresh-token grant was rejected or could not be sent
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The browser authorization flow did not produce tokens
    #[error("Interactive authorization failed: {0}")]
    AuthorizationFailed(String),

    /// A token provider could not mint an access token
    #[error("Failed to obtain access token: {0}")]
    TokenUnavailable(String),
}

/// Query and metadata failures surfaced by the query service
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Failed to list tables in dataset {dataset}: {message}")]
    DatasetEnumerationFailed { dataset: String, message: String },

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}

/// Request-shape failures detected before any service call
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing {0} argument")]
    MissingArgument(&'static str),

    #[error("Invalid {name} argument: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// Anything a single tool invocation can fail with
#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to render result: {0}")]
    Render(#[from] serde_json::Error),
}

/// Token store I/O failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token store {} is not a valid token record: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures talking to the warehouse API
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// A connection was requested without a project or location
    #[error("missing required connection setting: {0}")]
    MissingSetting(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("BigQuery API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The API answered with something we could not interpret
    #[error("Unexpected API response: {0}")]
    Decode(String),
}

impl WarehouseError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            WarehouseError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            WarehouseError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Configuration loading failures; all of them abort startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Startup failures of the server itself
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to connect to BigQuery: {0}")]
    Connect(#[from] WarehouseError),
}
