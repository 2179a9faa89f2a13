//! OAuth client configuration for the interactive flow

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::AuthError;

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const SETUP_GUIDANCE: &str = "create an OAuth client ID of type 'Desktop app' in the Google Cloud \
     console, download its JSON and point --client-secrets (or GOOGLE_CLIENT_SECRETS_FILE) at the \
     file, or pass the JSON content directly";

/// The `installed`/`web` block of a Google client secrets file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecrets {
    /// Resolve `source` as a path if one exists there, otherwise as inline JSON
    pub fn resolve(source: &str) -> Result<Self, AuthError> {
        let path = Path::new(source);
        if path.is_file() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                AuthError::MissingClientSecrets(format!(
                    "cannot read {}: {e}; {SETUP_GUIDANCE}",
                    path.display()
                ))
            })?;
            debug!(path = %path.display(), "Loaded client secrets from file");
            return Self::parse(&raw).map_err(|reason| {
                AuthError::MissingClientSecrets(format!(
                    "{} is not a client secrets file: {reason}; {SETUP_GUIDANCE}",
                    path.display()
                ))
            });
        }

        if source.trim_start().starts_with('{') {
            return Self::parse(source).map_err(|reason| {
                AuthError::MissingClientSecrets(format!(
                    "inline client secrets are invalid: {reason}; {SETUP_GUIDANCE}"
                ))
            });
        }

        Err(AuthError::MissingClientSecrets(format!(
            "no file at '{source}'; {SETUP_GUIDANCE}"
        )))
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let file: SecretsFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())?;
        if secrets.client_id.is_empty() {
            return Err("client_id is empty".to_string());
        }
        Ok(secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INSTALLED: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "s3cret",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_resolves_file_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client_secrets.json");
        std::fs::write(&path, INSTALLED).unwrap();

        let secrets = ClientSecrets::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "s3cret");
    }

    #[test]
    fn test_resolves_inline_web_json_with_defaults() {
        let inline = r#"{"web": {"client_id": "abc", "client_secret": "x"}}"#;
        let secrets = ClientSecrets::resolve(inline).unwrap();
        assert_eq!(secrets.client_id, "abc");
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_missing_file_carries_guidance() {
        let err = ClientSecrets::resolve("/nonexistent/client_secrets.json").unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, AuthError::MissingClientSecrets(_)));
        assert!(msg.contains("Desktop app"));
    }

    #[test]
    fn test_rejects_json_without_client_section() {
        let err = ClientSecrets::resolve(r#"{"other": {}}"#).unwrap_err();
        assert!(err.to_string().contains("installed"));
    }
}
