//! Configuration loading for bigquery-mcp
//!
//! Configuration is layered, highest priority first:
//! 1. Command-line flags
//! 2. Environment variables (`BIGQUERY_*`, `GOOGLE_*`)
//! 3. TOML file from `--config` / `BIGQUERY_MCP_CONFIG`, else
//!    `~/.binks/bigquery.toml` when it exists
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{builder::BoolishValueParser, Parser};
use serde::Deserialize;

use crate::auth::AuthStrategy;
use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const DEFAULT_CLIENT_SECRETS: &str = "client_secrets.json";
const DEFAULT_TOKEN_FILE: &str = "token.json";
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(name = "bigquery-mcp", version, about = "MCP server for read-only BigQuery access")]
pub struct CliArgs {
    /// GCP project that runs queries
    #[arg(long, env = "BIGQUERY_PROJECT")]
    pub project: Option<String>,

    /// BigQuery location, e.g. US or europe-west1
    #[arg(long, env = "BIGQUERY_LOCATION")]
    pub location: Option<String>,

    /// Service account key file
    #[arg(long, env = "BIGQUERY_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Restrict list-tables to these datasets (repeatable or comma separated)
    #[arg(long = "dataset", env = "BIGQUERY_DATASETS", value_delimiter = ',')]
    pub datasets: Vec<String>,

    /// Authenticate interactively in a browser and keep the tokens on disk
    #[arg(
        long,
        env = "BIGQUERY_OAUTH_FLOW",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub oauth_flow: Option<bool>,

    /// OAuth client secrets file, or the JSON itself
    #[arg(long, env = "GOOGLE_CLIENT_SECRETS_FILE")]
    pub client_secrets: Option<String>,

    /// Where the interactive flow stores its tokens
    #[arg(long = "token-file", env = "GOOGLE_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "BIGQUERY_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, env = "BIGQUERY_MCP_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// TOML file layout
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bigquery: BigQuerySection,
    pub oauth: OAuthSection,
    pub api: ApiSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BigQuerySection {
    pub project: Option<String>,
    pub location: Option<String>,
    pub key_file: Option<PathBuf>,
    pub datasets: Vec<String>,
    pub oauth_flow: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OAuthSection {
    pub client_secrets: Option<String>,
    pub token_file: Option<PathBuf>,
    pub callback_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// BigQuery REST endpoint settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub project: String,
    pub location: String,
    /// Dataset allow-list; empty means all visible datasets
    pub datasets: Vec<String>,
    pub strategy: AuthStrategy,
    pub api: ApiConfig,
    pub callback_timeout: Duration,
    pub log_file: Option<PathBuf>,
    /// The TOML file that was loaded, if any
    pub config_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Parse the process arguments and environment, then layer the file
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let (file, config_file) = match &args.config {
            // An explicitly named file must exist
            Some(path) => (FileConfig::read(path)?, Some(path.clone())),
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => (FileConfig::read(&path)?, Some(path)),
                None => (FileConfig::default(), None),
            },
        };

        let mut config = Self::resolve(args, file)?;
        config.config_file = config_file;
        Ok(config)
    }

    /// Merge CLI/env values over file values over defaults
    pub fn resolve(args: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let project = non_empty(args.project)
            .or_else(|| non_empty(file.bigquery.project))
            .ok_or(ConfigError::MissingSetting("project"))?;
        let location = non_empty(args.location)
            .or_else(|| non_empty(file.bigquery.location))
            .ok_or(ConfigError::MissingSetting("location"))?;

        let datasets = if args.datasets.is_empty() {
            file.bigquery.datasets
        } else {
            args.datasets
        };
        let datasets = datasets
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let oauth_flow = args
            .oauth_flow
            .or(file.bigquery.oauth_flow)
            .unwrap_or(false);
        let key_file = args
            .key_file
            .or(file.bigquery.key_file)
            .filter(|p| !p.as_os_str().is_empty());

        let strategy = if oauth_flow {
            AuthStrategy::InteractiveFlow {
                client_secrets: non_empty(args.client_secrets)
                    .or_else(|| non_empty(file.oauth.client_secrets))
                    .unwrap_or_else(|| DEFAULT_CLIENT_SECRETS.to_string()),
                token_store: args
                    .token_file
                    .or(file.oauth.token_file)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE)),
            }
        } else if let Some(path) = key_file {
            AuthStrategy::ServiceAccountKey(path)
        } else {
            AuthStrategy::AmbientDefault
        };

        let api = ApiConfig {
            base_url: non_empty(file.api.base_url)
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(
                file.api
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        };

        Ok(Self {
            project,
            location,
            datasets,
            strategy,
            api,
            callback_timeout: Duration::from_secs(
                file.oauth
                    .callback_timeout_secs
                    .unwrap_or(DEFAULT_CALLBACK_TIMEOUT_SECS),
            ),
            log_file: args.log_file,
            config_file: None,
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".binks").join("bigquery.toml"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
