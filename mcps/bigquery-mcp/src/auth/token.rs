//! Interactive-flow token source that refreshes itself in place

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::oauth::OAuthFlow;
use super::record::CredentialRecord;
use super::store::CredentialStore;
use crate::error::AuthError;

/// Current interactive credential. Refreshes happen under the record lock so
/// concurrent callers trigger at most one refresh grant.
pub struct InteractiveToken {
    record: Mutex<CredentialRecord>,
    store: CredentialStore,
    flow: Arc<dyn OAuthFlow>,
}

impl InteractiveToken {
    pub fn new(record: CredentialRecord, store: CredentialStore, flow: Arc<dyn OAuthFlow>) -> Self {
        Self {
            record: Mutex::new(record),
            store,
            flow,
        }
    }

    /// A valid access token, refreshing first if the current one expired
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut record = self.record.lock().await;
        if record.is_valid(Utc::now()) {
            return Ok(record.token.clone());
        }
        debug!("Interactive access token expired");
        self.refresh_locked(&mut record).await
    }

    /// Refresh regardless of the recorded expiry (after the API rejected it)
    pub async fn force_refresh(&self) -> Result<String, AuthError> {
        let mut record = self.record.lock().await;
        self.refresh_locked(&mut record).await
    }

    pub async fn snapshot(&self) -> CredentialRecord {
        self.record.lock().await.clone()
    }

    async fn refresh_locked(&self, record: &mut CredentialRecord) -> Result<String, AuthError> {
        if !record.can_refresh() {
            return Err(AuthError::TokenUnavailable(
                "access token expired and no refresh token is stored; call reauth-oauth"
                    .to_string(),
            ));
        }
        let refreshed = self.flow.refresh(record).await?;
        self.store.persist(&refreshed);
        *record = refreshed;
        Ok(record.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, FakeFlow};
    use chrono::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let dir = TempDir::new().unwrap();
        let flow = Arc::new(FakeFlow::default());
        let token = InteractiveToken::new(
            record("valid", None),
            CredentialStore::new(dir.path().join("token.json")),
            flow.clone(),
        );

        assert_eq!(token.access_token().await.unwrap(), "valid");
        assert_eq!(flow.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        let flow = Arc::new(FakeFlow::default());
        let expired = record("old", Some(Utc::now() - Duration::minutes(5)));
        let token = InteractiveToken::new(expired, store.clone(), flow.clone());

        let fresh = token.access_token().await.unwrap();
        assert_eq!(fresh, "refreshed-1");
        assert_eq!(flow.refresh_calls(), 1);
        assert_eq!(store.load().unwrap().unwrap().token, "refreshed-1");

        // Second call reuses the refreshed token
        assert_eq!(token.access_token().await.unwrap(), "refreshed-1");
        assert_eq!(flow.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut expired = record("old", Some(Utc::now() - Duration::minutes(5)));
        expired.refresh_token = None;
        let token = InteractiveToken::new(
            expired,
            CredentialStore::new(dir.path().join("token.json")),
            Arc::new(FakeFlow::default()),
        );

        let err = token.access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenUnavailable(_)));
    }
}
