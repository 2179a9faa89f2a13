//! Read queries and metadata lookups against the active connection

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::QueryError;
use crate::warehouse::{QueryParameter, Row, WarehouseClient};

/// Stateless over the client: every call reads the connection that is
/// active at that moment.
pub struct QueryService {
    client: Arc<WarehouseClient>,
    /// Dataset allow-list; empty means every visible dataset
    datasets: Vec<String>,
}

impl QueryService {
    pub fn new(client: Arc<WarehouseClient>, datasets: Vec<String>) -> Self {
        Self { client, datasets }
    }

    #[instrument(skip(self, sql, params))]
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<Row>, QueryError> {
        debug!(sql, "Executing query");
        let rows = self
            .client
            .warehouse()
            .await
            .query(sql, params)
            .await
            .map_err(|e| QueryError::ExecutionFailed(e.to_string()))?;
        info!(rows = rows.len(), "Query returned");
        Ok(rows)
    }

    /// `dataset.table` names across the allow-list (in configured order) or
    /// every visible dataset (in engine order)
    pub async fn list_tables(&self) -> Result<Vec<String>, QueryError> {
        let warehouse = self.client.warehouse().await;

        let datasets = if self.datasets.is_empty() {
            warehouse
                .list_datasets(None)
                .await
                .map_err(|e| QueryError::ExecutionFailed(e.to_string()))?
        } else {
            self.datasets.clone()
        };

        let mut names = Vec::new();
        for dataset in &datasets {
            let tables = warehouse.list_tables(dataset).await.map_err(|e| {
                QueryError::DatasetEnumerationFailed {
                    dataset: dataset.clone(),
                    message: e.to_string(),
                }
            })?;
            names.extend(tables.into_iter().map(|table| format!("{dataset}.{table}")));
        }

        debug!(datasets = datasets.len(), tables = names.len(), "Listed tables");
        Ok(names)
    }

    /// DDL rows for `dataset.table` or `project.dataset.table`
    pub async fn describe_table(&self, table_name: &str) -> Result<Vec<Row>, QueryError> {
        let (dataset, table) = parse_table_name(table_name)?;
        let sql = format!(
            "SELECT ddl FROM `{dataset}.INFORMATION_SCHEMA.TABLES` WHERE table_name = @table_name"
        );
        self.execute_query(&sql, &[QueryParameter::string("table_name", table)])
            .await
    }
}

/// Split a table reference into the dataset qualifier and the bare table
/// name. With three segments the dataset keeps its project prefix.
pub fn parse_table_name(name: &str) -> Result<(String, String), QueryError> {
    let invalid = |reason: &str| {
        QueryError::InvalidTableName(format!(
            "{name} ({reason}; expected dataset.table or project.dataset.table)"
        ))
    };

    if name.contains('`') {
        return Err(invalid("backticks are not allowed"));
    }
    let parts: Vec<&str> = name.split('.').collect();
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid("empty name segment"));
    }

    match parts.as_slice() {
        [dataset, table] => Ok((dataset.to_string(), table.to_string())),
        [project, dataset, table] => Ok((format!("{project}.{dataset}"), table.to_string())),
        _ => Err(invalid("wrong number of segments")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{interactive_credential, FakeConnector, FakeWarehouse};
    use serde_json::json;

    async fn service(fake: FakeWarehouse, datasets: &[&str]) -> QueryService {
        let connector = Arc::new(FakeConnector::new(fake));
        let client = WarehouseClient::connect(connector, interactive_credential(), "p", "US")
            .await
            .unwrap();
        QueryService::new(
            Arc::new(client),
            datasets.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[test]
    fn test_parse_table_name_segments() {
        assert!(parse_table_name("a").is_err());
        assert_eq!(
            parse_table_name("a.b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert_eq!(
            parse_table_name("a.b.c").unwrap(),
            ("a.b".to_string(), "c".to_string())
        );
        assert!(parse_table_name("a.b.c.d").is_err());
    }

    #[test]
    fn test_parse_table_name_rejects_empty_and_backticks() {
        assert!(parse_table_name("").is_err());
        assert!(parse_table_name("a.").is_err());
        assert!(parse_table_name(".b").is_err());
        assert!(parse_table_name("a..c").is_err());
        let err = parse_table_name("d`; DROP TABLE x; --.t").unwrap_err();
        assert!(matches!(err, QueryError::InvalidTableName(_)));
    }

    #[tokio::test]
    async fn test_allow_list_scans_only_configured_datasets_in_order() {
        let fake = FakeWarehouse::with_datasets(&["d0", "d1", "d2", "d3"])
            .with_tables("d2", &["z", "a"])
            .with_tables("d1", &["t1"])
            .with_tables("d3", &["ignored"]);
        let svc = service(fake.clone(), &["d2", "d1"]).await;

        let tables = svc.list_tables().await.unwrap();
        assert_eq!(tables, vec!["d2.z", "d2.a", "d1.t1"]);
        assert_eq!(fake.listed(), vec!["d2", "d1"]);
    }

    #[tokio::test]
    async fn test_without_allow_list_scans_every_dataset() {
        let fake = FakeWarehouse::with_datasets(&["b", "a"])
            .with_tables("b", &["t"])
            .with_tables("a", &[]);
        let svc = service(fake.clone(), &[]).await;

        assert_eq!(svc.list_tables().await.unwrap(), vec!["b.t"]);
        assert_eq!(fake.listed(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_missing_configured_dataset_fails_enumeration() {
        let fake = FakeWarehouse::with_datasets(&["d1"]).with_tables("d1", &["t"]);
        let svc = service(fake, &["d1", "gone"]).await;

        match svc.list_tables().await.unwrap_err() {
            QueryError::DatasetEnumerationFailed { dataset, message } => {
                assert_eq!(dataset, "gone");
                assert!(message.contains("Not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_describe_table_issues_parameterized_ddl_query() {
        let row = json!({"ddl": "CREATE TABLE `p.d.t` (id INT64)"});
        let fake = FakeWarehouse::default().with_rows(vec![row.as_object().unwrap().clone()]);
        let svc = service(fake.clone(), &[]).await;

        let rows = svc.describe_table("p.d.t").await.unwrap();
        assert_eq!(rows.len(), 1);

        let (sql, params) = fake.queries().pop().unwrap();
        assert_eq!(
            sql,
            "SELECT ddl FROM `p.d.INFORMATION_SCHEMA.TABLES` WHERE table_name = @table_name"
        );
        assert_eq!(params, vec![QueryParameter::string("table_name", "t")]);
    }

    #[tokio::test]
    async fn test_describe_unknown_table_is_empty() {
        let svc = service(FakeWarehouse::default(), &[]).await;
        assert!(svc.describe_table("d.missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_is_execution_failed() {
        let fake = FakeWarehouse::default();
        fake.fail_next_query("Syntax error: Unexpected keyword FORM");
        let svc = service(fake, &[]).await;

        let err = svc.execute_query("SELECT * FORM t", &[]).await.unwrap_err();
        assert!(matches!(err, QueryError::ExecutionFailed(ref m) if m.contains("FORM")));
    }
}
