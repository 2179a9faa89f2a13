//! In-memory fakes for the warehouse and OAuth seams

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{
    ClientSecrets, Credential, CredentialRecord, CredentialStore, InteractiveToken, OAuthFlow,
    SCOPE,
};
use crate::error::{AuthError, WarehouseError};
use crate::warehouse::{Connector, QueryParameter, Row, Warehouse};

pub fn record(token: &str, expiry: Option<DateTime<Utc>>) -> CredentialRecord {
    CredentialRecord {
        token: token.to_string(),
        refresh_token: Some("1//refresh".to_string()),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        scopes: vec![SCOPE.to_string()],
        expiry,
    }
}

/// A non-expiring interactive credential that never touches disk
pub fn interactive_credential() -> Credential {
    let store = CredentialStore::new(std::env::temp_dir().join("bigquery-mcp-test-unused.json"));
    Credential::Interactive(Arc::new(InteractiveToken::new(
        record("test-token", None),
        store,
        Arc::new(FakeFlow::default()),
    )))
}

#[derive(Default)]
pub struct FakeFlow {
    refresh_calls: AtomicUsize,
    authorize_calls: AtomicUsize,
    fail_refresh: AtomicBool,
    fail_authorize: AtomicBool,
}

impl FakeFlow {
    pub fn failing_refresh() -> Self {
        let flow = Self::default();
        flow.fail_refresh.store(true, Ordering::SeqCst);
        flow
    }

    pub fn failing_authorize() -> Self {
        let flow = Self::default();
        flow.fail_authorize.store(true, Ordering::SeqCst);
        flow
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn authorize_calls(&self) -> usize {
        self.authorize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthFlow for FakeFlow {
    async fn refresh(&self, previous: &CredentialRecord) -> Result<CredentialRecord, AuthError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::RefreshFailed("invalid_grant".to_string()));
        }
        Ok(CredentialRecord {
            token: format!("refreshed-{n}"),
            expiry: None,
            ..previous.clone()
        })
    }

    async fn authorize(&self, _secrets: &ClientSecrets) -> Result<CredentialRecord, AuthError> {
        let n = self.authorize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_authorize.load(Ordering::SeqCst) {
            return Err(AuthError::AuthorizationFailed(
                "authorization was denied: access_denied".to_string(),
            ));
        }
        Ok(record(&format!("authorized-{n}"), None))
    }
}

#[derive(Default)]
struct FakeState {
    datasets: Vec<String>,
    tables: HashMap<String, Vec<String>>,
    rows: Vec<Row>,
    /// Every operation fails with this message
    failure: Option<String>,
    /// Only the next query fails with this message
    next_query_failure: Option<String>,
    queries: Vec<(String, Vec<QueryParameter>)>,
    listed: Vec<String>,
}

/// Scripted warehouse. Clones share state so tests can inspect calls made
/// through a handle owned by the client.
#[derive(Clone, Default)]
pub struct FakeWarehouse {
    state: Arc<Mutex<FakeState>>,
}

impl FakeWarehouse {
    pub fn with_datasets(datasets: &[&str]) -> Self {
        let fake = Self::default();
        fake.lock().datasets = datasets.iter().map(|d| d.to_string()).collect();
        fake
    }

    pub fn failing(message: &str) -> Self {
        let fake = Self::default();
        fake.lock().failure = Some(message.to_string());
        fake
    }

    /// Tables for `dataset`; datasets without tables answer NotFound
    pub fn with_tables(self, dataset: &str, tables: &[&str]) -> Self {
        self.lock().tables.insert(
            dataset.to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.lock().rows = rows;
        self
    }

    pub fn fail_next_query(&self, message: &str) {
        self.lock().next_query_failure = Some(message.to_string());
    }

    pub fn queries(&self) -> Vec<(String, Vec<QueryParameter>)> {
        self.lock().queries.clone()
    }

    /// Datasets passed to `list_tables`, in call order
    pub fn listed(&self) -> Vec<String> {
        self.lock().listed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn api_error(message: &str) -> WarehouseError {
    WarehouseError::Api {
        status: 403,
        message: message.to_string(),
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn query(
        &self,
        sql: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<Row>, WarehouseError> {
        let mut state = self.lock();
        state.queries.push((sql.to_string(), params.to_vec()));
        if let Some(message) = state.failure.clone().or(state.next_query_failure.take()) {
            return Err(WarehouseError::Api {
                status: 400,
                message,
            });
        }
        Ok(state.rows.clone())
    }

    async fn list_datasets(&self, limit: Option<u32>) -> Result<Vec<String>, WarehouseError> {
        let state = self.lock();
        if let Some(message) = &state.failure {
            return Err(api_error(message));
        }
        let mut datasets = state.datasets.clone();
        if let Some(limit) = limit {
            datasets.truncate(limit as usize);
        }
        Ok(datasets)
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError> {
        let mut state = self.lock();
        state.listed.push(dataset.to_string());
        if let Some(message) = &state.failure {
            return Err(api_error(message));
        }
        state.tables.get(dataset).cloned().ok_or_else(|| {
            WarehouseError::NotFound(format!("Not found: Dataset p:{dataset}"))
        })
    }
}

/// Hands out the scripted warehouse, or fails when told to
pub struct FakeConnector {
    next: Mutex<Result<FakeWarehouse, String>>,
}

impl FakeConnector {
    pub fn new(warehouse: FakeWarehouse) -> Self {
        Self {
            next: Mutex::new(Ok(warehouse)),
        }
    }

    pub fn set_next(&self, warehouse: FakeWarehouse) {
        *self.next.lock().unwrap() = Ok(warehouse);
    }

    pub fn fail_next(&self, message: &str) {
        *self.next.lock().unwrap() = Err(message.to_string());
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _credential: Credential,
        _project: &str,
        _location: &str,
    ) -> Result<Arc<dyn Warehouse>, WarehouseError> {
        match &*self.next.lock().unwrap() {
            Ok(warehouse) => Ok(Arc::new(warehouse.clone())),
            Err(message) => Err(api_error(message)),
        }
    }
}
