//! Credential acquisition and live re-authentication

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gcp_auth::CustomServiceAccount;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::oauth::{LoopbackFlow, OAuthFlow};
use super::record::CredentialRecord;
use super::secrets::ClientSecrets;
use super::store::CredentialStore;
use super::token::InteractiveToken;
use super::{AuthStrategy, Credential};
use crate::error::AuthError;
use crate::warehouse::WarehouseClient;

pub struct CredentialProvider {
    strategy: AuthStrategy,
    flow: Arc<dyn OAuthFlow>,
    /// Held for the whole re-authentication so only one runs at a time
    reauth: Mutex<()>,
}

impl CredentialProvider {
    /// Provider using the browser loopback flow for interactive logins
    pub fn new(strategy: AuthStrategy, callback_timeout: Duration) -> Result<Self, AuthError> {
        let flow = LoopbackFlow::new(callback_timeout)?;
        Ok(Self::with_flow(strategy, Arc::new(flow)))
    }

    pub fn with_flow(strategy: AuthStrategy, flow: Arc<dyn OAuthFlow>) -> Self {
        Self {
            strategy,
            flow,
            reauth: Mutex::new(()),
        }
    }

    pub fn strategy(&self) -> &AuthStrategy {
        &self.strategy
    }

    /// Produce a usable credential for the configured strategy
    #[instrument(skip(self), fields(strategy = %self.strategy))]
    pub async fn acquire(&self) -> Result<Credential, AuthError> {
        match &self.strategy {
            AuthStrategy::ServiceAccountKey(path) => {
                let account = CustomServiceAccount::from_file(path).map_err(|e| {
                    AuthError::InvalidKeyFile {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                info!(path = %path.display(), "Loaded service account key");
                Ok(Credential::ServiceAccount(Arc::new(account)))
            }
            AuthStrategy::AmbientDefault => {
                let provider = gcp_auth::provider()
                    .await
                    .map_err(|e| AuthError::NoDefaultCredentials(e.to_string()))?;
                info!("Using application default credentials");
                Ok(Credential::Ambient(provider))
            }
            AuthStrategy::InteractiveFlow {
                client_secrets,
                token_store,
            } => self.acquire_interactive(client_secrets, token_store).await,
        }
    }

    async fn acquire_interactive(
        &self,
        client_secrets: &str,
        token_store: &Path,
    ) -> Result<Credential, AuthError> {
        let secrets = ClientSecrets::resolve(client_secrets)?;
        let store = CredentialStore::new(token_store);

        let record = match store.load_or_discard() {
            Some(record) if record.is_valid(Utc::now()) => {
                info!("Using stored OAuth credential");
                record
            }
            Some(record) if record.can_refresh() => match self.flow.refresh(&record).await {
                Ok(refreshed) => {
                    store.persist(&refreshed);
                    refreshed
                }
                Err(e) => {
                    warn!(error = %e, "Stored OAuth credential could not be refreshed");
                    self.authorize(&secrets, &store).await?
                }
            },
            Some(_) => {
                info!("Stored OAuth credential expired without a refresh token");
                self.authorize(&secrets, &store).await?
            }
            None => {
                info!("No stored OAuth credential");
                self.authorize(&secrets, &store).await?
            }
        };

        Ok(self.interactive(record, store))
    }

    async fn authorize(
        &self,
        secrets: &ClientSecrets,
        store: &CredentialStore,
    ) -> Result<CredentialRecord, AuthError> {
        let record = self.flow.authorize(secrets).await?;
        store.persist(&record);
        Ok(record)
    }

    fn interactive(&self, record: CredentialRecord, store: CredentialStore) -> Credential {
        Credential::Interactive(Arc::new(InteractiveToken::new(
            record,
            store,
            self.flow.clone(),
        )))
    }

    /// Discard the stored login, run the browser flow again and install a
    /// verified connection for the new credential. The new record is written
    /// to the token store only after verification; on any failure the client
    /// keeps its previous connection.
    pub async fn reauthenticate(&self, client: &WarehouseClient) -> Result<u64, AuthError> {
        let AuthStrategy::InteractiveFlow {
            client_secrets,
            token_store,
        } = &self.strategy
        else {
            return Err(AuthError::NotInteractive);
        };

        let _guard = self.reauth.lock().await;
        info!("Starting OAuth re-authentication");

        let secrets = ClientSecrets::resolve(client_secrets)
            .map_err(|e| AuthError::ReauthFailed(e.to_string()))?;
        let store = CredentialStore::new(token_store);
        store.discard();

        let record = self
            .flow
            .authorize(&secrets)
            .await
            .map_err(|e| AuthError::ReauthFailed(e.to_string()))?;

        // Persist only once the new credential has passed the probe
        let generation = client
            .reconnect_verified(self.interactive(record.clone(), store.clone()))
            .await
            .map_err(|e| AuthError::ReauthFailed(e.to_string()))?;
        store.persist(&record);

        info!(generation, "OAuth re-authentication complete");
        Ok(generation)
    }
}
