//! Credential lifecycle
//!
//! Three mutually exclusive strategies produce a [`Credential`]:
//!
//! - **ServiceAccountKey**: key material from a JSON key file, signed per
//!   request by `gcp_auth`
//! - **AmbientDefault**: whatever `gcp_auth` discovers from the environment,
//!   gcloud configuration or the metadata server
//! - **InteractiveFlow**: a browser login whose tokens are persisted to a
//!   token store and refreshed across restarts. Only this strategy supports
//!   re-authentication while the server is running.

pub mod callback;
pub mod oauth;
pub mod provider;
pub mod record;
pub mod secrets;
pub mod store;
pub mod token;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gcp_auth::TokenProvider;

use crate::error::AuthError;

pub use oauth::{LoopbackFlow, OAuthFlow};
pub use provider::CredentialProvider;
pub use record::CredentialRecord;
pub use secrets::ClientSecrets;
pub use store::CredentialStore;
pub use token::InteractiveToken;

/// OAuth scope requested by every strategy
pub const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// How this server instance obtains credentials. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    ServiceAccountKey(PathBuf),
    AmbientDefault,
    InteractiveFlow {
        /// Path to a client secrets file, or the JSON itself
        client_secrets: String,
        token_store: PathBuf,
    },
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStrategy::ServiceAccountKey(path) => {
                write!(f, "service account key ({})", path.display())
            }
            AuthStrategy::AmbientDefault => write!(f, "application default credentials"),
            AuthStrategy::InteractiveFlow { token_store, .. } => {
                write!(f, "interactive OAuth (token store {})", token_store.display())
            }
        }
    }
}

/// A bearer token source tagged with the strategy that produced it
#[derive(Clone)]
pub enum Credential {
    ServiceAccount(Arc<dyn TokenProvider>),
    Ambient(Arc<dyn TokenProvider>),
    Interactive(Arc<InteractiveToken>),
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ServiceAccount(_) => "service_account",
            Credential::Ambient(_) => "ambient",
            Credential::Interactive(_) => "interactive",
        }
    }

    /// Current access token; providers refresh internally when needed
    pub async fn access_token(&self) -> Result<String, AuthError> {
        match self {
            Credential::ServiceAccount(provider) | Credential::Ambient(provider) => provider
                .token(&[SCOPE])
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| AuthError::TokenUnavailable(e.to_string())),
            Credential::Interactive(token) => token.access_token().await,
        }
    }

    /// Called after the API rejected a token. `gcp_auth` providers re-mint
    /// on their own schedule, so only the interactive token is forced.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        match self {
            Credential::Interactive(token) => token.force_refresh().await,
            _ => self.access_token().await,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.kind()).finish()
    }
}
