//! Network half of the interactive strategy: refresh grants and the
//! loopback authorization-code flow (PKCE + CSRF state)

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::{info, warn};

use super::callback::CallbackServer;
use super::record::CredentialRecord;
use super::secrets::{ClientSecrets, DEFAULT_TOKEN_URI};
use super::SCOPE;
use crate::error::AuthError;

/// Token endpoint operations the credential provider depends on
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    /// Exchange the record's refresh token for a new access token
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord, AuthError>;

    /// Run the full browser authorization and return a fresh record
    async fn authorize(&self, secrets: &ClientSecrets) -> Result<CredentialRecord, AuthError>;
}

/// Installed-application flow with a loopback redirect
pub struct LoopbackFlow {
    http: reqwest::Client,
    callback_timeout: Duration,
}

impl LoopbackFlow {
    pub fn new(callback_timeout: Duration) -> Result<Self, AuthError> {
        // Token endpoints must not be followed through redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::AuthorizationFailed(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            callback_timeout,
        })
    }
}

#[async_trait]
impl OAuthFlow for LoopbackFlow {
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord, AuthError> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::RefreshFailed("no refresh token stored".to_string()))?;

        let token_uri = if record.token_uri.is_empty() {
            DEFAULT_TOKEN_URI
        } else {
            record.token_uri.as_str()
        };
        let token_url = TokenUrl::new(token_uri.to_string())
            .map_err(|e| AuthError::RefreshFailed(format!("invalid token_uri: {e}")))?;

        let mut client = BasicClient::new(ClientId::new(record.client_id.clone()))
            .set_token_uri(token_url);
        if !record.client_secret.is_empty() {
            client = client.set_client_secret(ClientSecret::new(record.client_secret.clone()));
        }

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::RefreshFailed(describe_token_error(e)))?;

        info!(client_id = %record.client_id, "Access token refreshed");
        Ok(record_from_response(
            &response,
            &record.client_id,
            &record.client_secret,
            token_uri,
            record.refresh_token.clone(),
        ))
    }

    async fn authorize(&self, secrets: &ClientSecrets) -> Result<CredentialRecord, AuthError> {
        let invalid = |what: &str, e: oauth2::url::ParseError| {
            AuthError::AuthorizationFailed(format!("invalid {what}: {e}"))
        };

        let server = CallbackServer::bind().await?;
        let client = BasicClient::new(ClientId::new(secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(secrets.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(secrets.auth_uri.clone()).map_err(|e| invalid("auth_uri", e))?)
            .set_token_uri(
                TokenUrl::new(secrets.token_uri.clone()).map_err(|e| invalid("token_uri", e))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(server.redirect_uri()).map_err(|e| invalid("redirect URI", e))?,
            );

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(challenge)
            .url();

        info!(url = %auth_url, "Authorize BigQuery access in your browser");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "Could not open a browser; visit the logged URL manually");
        }

        let params = server.wait(self.callback_timeout).await?;
        if let Some(error) = params.error {
            return Err(AuthError::AuthorizationFailed(format!(
                "authorization was denied: {error}"
            )));
        }
        if params.state.as_deref() != Some(csrf.secret().as_str()) {
            return Err(AuthError::AuthorizationFailed(
                "state mismatch in OAuth redirect".to_string(),
            ));
        }
        let code = params.code.ok_or_else(|| {
            AuthError::AuthorizationFailed("OAuth redirect carried no code".to_string())
        })?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::AuthorizationFailed(describe_token_error(e)))?;

        if response.refresh_token().is_none() {
            warn!("Authorization returned no refresh token; the next restart will prompt again");
        }
        info!("Interactive authorization completed");

        Ok(record_from_response(
            &response,
            &secrets.client_id,
            &secrets.client_secret,
            &secrets.token_uri,
            None,
        ))
    }
}

/// Build a record from a token response. Google omits the refresh token on
/// refresh grants, so the previous one is kept when none comes back.
fn record_from_response(
    response: &BasicTokenResponse,
    client_id: &str,
    client_secret: &str,
    token_uri: &str,
    previous_refresh: Option<String>,
) -> CredentialRecord {
    let expiry = response
        .expires_in()
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| Utc::now() + d);

    let scopes = response
        .scopes()
        .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
        .unwrap_or_else(|| vec![SCOPE.to_string()]);

    CredentialRecord {
        token: response.access_token().secret().clone(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or(previous_refresh),
        token_uri: token_uri.to_string(),
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        scopes,
        expiry,
    }
}

fn describe_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => match resp.error_description() {
            Some(description) => format!("{}: {description}", resp.error()),
            None => resp.error().to_string(),
        },
        RequestTokenError::Request(e) => format!("token request failed: {e}"),
        RequestTokenError::Parse(e, _body) => format!("unexpected token response: {e}"),
        RequestTokenError::Other(message) => message,
    }
}
