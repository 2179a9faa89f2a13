//! Warehouse connection management
//!
//! A [`WarehouseClient`] owns exactly one [`ActiveConnection`] at a time.
//! Re-authentication builds a complete replacement through a [`Connector`]
//! and swaps it in atomically, so readers always see either the old or the
//! new connection.

pub mod rest;
pub mod rows;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::Credential;
use crate::error::WarehouseError;

pub use rest::{BigQueryRest, RestConnector};

/// One result row, field name to decoded value, in schema order
pub type Row = Map<String, Value>;

/// A named query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: String,
    /// BigQuery standard SQL type name, e.g. `STRING`
    pub type_name: &'static str,
    pub value: String,
}

impl QueryParameter {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: "STRING",
            value: value.into(),
        }
    }
}

/// Operations available on a connected warehouse handle
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a standard SQL query and return every row
    async fn query(&self, sql: &str, params: &[QueryParameter])
        -> Result<Vec<Row>, WarehouseError>;

    /// Dataset ids visible in the project, at most `limit` when given
    async fn list_datasets(&self, limit: Option<u32>) -> Result<Vec<String>, WarehouseError>;

    /// Table ids in one dataset
    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError>;
}

/// Builds warehouse handles bound to a credential
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credential: Credential,
        project: &str,
        location: &str,
    ) -> Result<Arc<dyn Warehouse>, WarehouseError>;
}

/// The connection currently in use. Replaced wholesale, never mutated.
pub struct ActiveConnection {
    pub generation: u64,
    pub credential: Credential,
    pub warehouse: Arc<dyn Warehouse>,
}

pub struct WarehouseClient {
    project: String,
    location: String,
    connector: Arc<dyn Connector>,
    active: RwLock<Arc<ActiveConnection>>,
}

impl WarehouseClient {
    /// Build the first connection. Project and location must be non-empty.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        credential: Credential,
        project: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<Self, WarehouseError> {
        let project = project.into();
        let location = location.into();
        if project.trim().is_empty() {
            return Err(WarehouseError::MissingSetting("project"));
        }
        if location.trim().is_empty() {
            return Err(WarehouseError::MissingSetting("location"));
        }

        let warehouse = connector
            .connect(credential.clone(), &project, &location)
            .await?;
        info!(%project, %location, credential = credential.kind(), "Connected to BigQuery");

        Ok(Self {
            project,
            location,
            connector,
            active: RwLock::new(Arc::new(ActiveConnection {
                generation: 1,
                credential,
                warehouse,
            })),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub async fn current(&self) -> Arc<ActiveConnection> {
        self.active.read().await.clone()
    }

    pub async fn warehouse(&self) -> Arc<dyn Warehouse> {
        self.active.read().await.warehouse.clone()
    }

    pub async fn generation(&self) -> u64 {
        self.active.read().await.generation
    }

    /// Replace the connection once a handle for `credential` is built
    pub async fn reconnect(&self, credential: Credential) -> Result<u64, WarehouseError> {
        let warehouse = self.build(&credential).await?;
        Ok(self.install(credential, warehouse).await)
    }

    /// Like [`reconnect`](Self::reconnect) but the new handle must also
    /// answer a minimal dataset listing before it is installed
    pub async fn reconnect_verified(&self, credential: Credential) -> Result<u64, WarehouseError> {
        let warehouse = self.build(&credential).await?;
        warehouse.list_datasets(Some(1)).await?;
        debug!("New connection answered probe");
        Ok(self.install(credential, warehouse).await)
    }

    async fn build(&self, credential: &Credential) -> Result<Arc<dyn Warehouse>, WarehouseError> {
        self.connector
            .connect(credential.clone(), &self.project, &self.location)
            .await
    }

    async fn install(&self, credential: Credential, warehouse: Arc<dyn Warehouse>) -> u64 {
        let mut active = self.active.write().await;
        let generation = active.generation + 1;
        *active = Arc::new(ActiveConnection {
            generation,
            credential,
            warehouse,
        });
        info!(
            generation,
            credential = active.credential.kind(),
            "Installed new BigQuery connection"
        );
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{interactive_credential, FakeConnector, FakeWarehouse};

    #[tokio::test]
    async fn test_rejects_empty_project_or_location() {
        let connector = Arc::new(FakeConnector::new(FakeWarehouse::default()));
        let err = WarehouseClient::connect(connector.clone(), interactive_credential(), "", "US")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WarehouseError::MissingSetting("project")));

        let err = WarehouseClient::connect(connector, interactive_credential(), "proj", " ")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WarehouseError::MissingSetting("location")));
    }

    #[tokio::test]
    async fn test_reconnect_swaps_connection() {
        let connector = Arc::new(FakeConnector::new(FakeWarehouse::default()));
        let client = WarehouseClient::connect(connector.clone(), interactive_credential(), "p", "US")
            .await
            .unwrap();
        assert_eq!(client.project(), "p");
        assert_eq!(client.location(), "US");
        assert_eq!(client.generation().await, 1);

        let before = client.current().await;
        connector.set_next(FakeWarehouse::with_datasets(&["fresh"]));
        assert_eq!(client.reconnect(interactive_credential()).await.unwrap(), 2);

        // Old snapshot is untouched; new readers see the replacement
        assert_eq!(before.generation, 1);
        let datasets = client.warehouse().await.list_datasets(None).await.unwrap();
        assert_eq!(datasets, vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_probe_keeps_previous_connection() {
        let connector = Arc::new(FakeConnector::new(FakeWarehouse::with_datasets(&["old"])));
        let client = WarehouseClient::connect(connector.clone(), interactive_credential(), "p", "US")
            .await
            .unwrap();

        connector.set_next(FakeWarehouse::failing("Access Denied"));
        assert!(client
            .reconnect_verified(interactive_credential())
            .await
            .is_err());

        assert_eq!(client.generation().await, 1);
        let datasets = client.warehouse().await.list_datasets(None).await.unwrap();
        assert_eq!(datasets, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_connection() {
        let connector = Arc::new(FakeConnector::new(FakeWarehouse::default()));
        let client = WarehouseClient::connect(connector.clone(), interactive_credential(), "p", "US")
            .await
            .unwrap();

        connector.fail_next("quota exceeded");
        assert!(client.reconnect(interactive_credential()).await.is_err());
        assert_eq!(client.generation().await, 1);
    }
}
