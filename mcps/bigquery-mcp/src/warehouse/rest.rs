//! BigQuery v2 REST API handle

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::rows::{decode_rows, TableSchema};
use super::{Connector, QueryParameter, Row, Warehouse};
use crate::auth::Credential;
use crate::config::ApiConfig;
use crate::error::WarehouseError;

/// Server-side wait per jobs.query / getQueryResults call
const POLL_TIMEOUT_MS: u64 = 10_000;
const PAGE_SIZE: u32 = 1000;

fn retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(3)
        .with_jitter()
}

/// Builds [`BigQueryRest`] handles that share one HTTP client
pub struct RestConnector {
    http: reqwest::Client,
    base_url: Url,
}

impl RestConnector {
    pub fn new(api: &ApiConfig) -> Result<Self, WarehouseError> {
        let base_url = Url::parse(&api.base_url)
            .map_err(|e| WarehouseError::Decode(format!("invalid API base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(WarehouseError::Decode(format!(
                "invalid API base URL: {base_url}"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(api.request_timeout)
            .build()?;
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl Connector for RestConnector {
    async fn connect(
        &self,
        credential: Credential,
        project: &str,
        location: &str,
    ) -> Result<Arc<dyn Warehouse>, WarehouseError> {
        // Mint a token now so a broken credential fails construction
        credential.access_token().await?;
        Ok(Arc::new(BigQueryRest {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            project: project.to_string(),
            location: location.to_string(),
            credential,
        }))
    }
}

pub struct BigQueryRest {
    http: reqwest::Client,
    base_url: Url,
    project: String,
    location: String,
    credential: Credential,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<Value>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl Warehouse for BigQueryRest {
    #[instrument(skip_all)]
    async fn query(
        &self,
        sql: &str,
        params: &[QueryParameter],
    ) -> Result<Vec<Row>, WarehouseError> {
        let url = self.endpoint(&["projects", &self.project, "queries"])?;
        let request_id = Uuid::new_v4().to_string();
        let body = query_body(sql, &self.location, params, &request_id);
        let mut response: QueryResponse = self.call(Method::POST, url, Some(&body)).await?;

        let job = response
            .job_reference
            .clone()
            .ok_or_else(|| WarehouseError::Decode("query response has no jobReference".into()))?;

        let mut schema: Option<TableSchema> = None;
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            if response.job_complete {
                if schema.is_none() {
                    schema = response.schema.take();
                }
                if !response.rows.is_empty() {
                    let schema = schema.as_ref().ok_or_else(|| {
                        WarehouseError::Decode("query rows arrived without a schema".into())
                    })?;
                    rows.extend(decode_rows(schema, &response.rows)?);
                }
                match response.page_token.take() {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            } else {
                debug!(job_id = %job.job_id, "Query still running");
            }
            response = self.query_results(&job, page_token.as_deref()).await?;
        }

        debug!(job_id = %job.job_id, rows = rows.len(), "Query finished");
        Ok(rows)
    }

    async fn list_datasets(&self, limit: Option<u32>) -> Result<Vec<String>, WarehouseError> {
        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.endpoint(&["projects", &self.project, "datasets"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", &limit.unwrap_or(PAGE_SIZE).to_string());
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let page: DatasetList = self.call(Method::GET, url, None).await?;
            datasets.extend(
                page.datasets
                    .into_iter()
                    .map(|d| d.dataset_reference.dataset_id),
            );

            if let Some(limit) = limit {
                datasets.truncate(limit as usize);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(datasets)
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>, WarehouseError> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url =
                self.endpoint(&["projects", &self.project, "datasets", dataset, "tables"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", &PAGE_SIZE.to_string());
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let page: TableList = self.call(Method::GET, url, None).await?;
            tables.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(tables)
    }
}

impl BigQueryRest {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, WarehouseError> {
        endpoint(&self.base_url, segments)
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, WarehouseError> {
        let mut url = self.endpoint(&["projects", &self.project, "queries", &job.job_id])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "location",
                job.location.as_deref().unwrap_or(&self.location),
            );
            query.append_pair("timeoutMs", &POLL_TIMEOUT_MS.to_string());
            query.append_pair("formatOptions.useInt64Timestamp", "true");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        self.call(Method::GET, url, None).await
    }

    /// Send with backoff on transient failures and decode the JSON body
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, WarehouseError> {
        let value = (|| async { self.call_once(method.clone(), url.clone(), body).await })
            .retry(retry_policy())
            .when(|e: &WarehouseError| e.is_retryable())
            .notify(|err, dur: Duration| {
                warn!(error = %err, delay = ?dur, "Retrying BigQuery request");
            })
            .await?;
        serde_json::from_value(value).map_err(|e| WarehouseError::Decode(e.to_string()))
    }

    /// One attempt. A 401 refreshes the credential and retries exactly once.
    async fn call_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, WarehouseError> {
        let token = self.credential.access_token().await?;
        let response = self
            .request(method.clone(), url.clone(), body, &token)
            .send()
            .await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Access token rejected; refreshing credential");
            let token = self.credential.refresh().await?;
            self.request(method, url, body, &token).send().await?
        } else {
            response
        };

        read_response(response).await
    }

    fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: &str,
    ) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url).bearer_auth(token);
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, WarehouseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| WarehouseError::Decode(format!("invalid API base URL: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `request_id` makes retried submissions of the same body idempotent
fn query_body(sql: &str, location: &str, params: &[QueryParameter], request_id: &str) -> Value {
    let mut body = json!({
        "query": sql,
        "requestId": request_id,
        "useLegacySql": false,
        "location": location,
        "timeoutMs": POLL_TIMEOUT_MS,
        "formatOptions": { "useInt64Timestamp": true },
    });
    if !params.is_empty() {
        body["parameterMode"] = json!("NAMED");
        body["queryParameters"] = params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "parameterType": { "type": p.type_name },
                    "parameterValue": { "value": p.value },
                })
            })
            .collect();
    }
    body
}

async fn read_response(response: reqwest::Response) -> Result<Value, WarehouseError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| WarehouseError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = google_error_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("no response body").to_string()
        } else {
            body
        }
    });

    if status == StatusCode::NOT_FOUND {
        Err(WarehouseError::NotFound(message))
    } else {
        Err(WarehouseError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn google_error_message(body: &str) -> Option<String> {
    let parsed: GoogleErrorBody = serde_json::from_str(body).ok()?;
    if !parsed.error.status.is_empty() {
        debug!(status = %parsed.error.status, "BigQuery API error status");
    }
    Some(parsed.error.message).filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_escapes_segments() {
        let base = Url::parse("https://bigquery.googleapis.com/bigquery/v2/").unwrap();
        let url = endpoint(&base, &["projects", "my-proj", "datasets", "a b", "tables"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://bigquery.googleapis.com/bigquery/v2/projects/my-proj/datasets/a%20b/tables"
        );

        let bare = Url::parse("http://127.0.0.1:9050/bigquery/v2").unwrap();
        let url = endpoint(&bare, &["projects", "p", "queries"]).unwrap();
        assert_eq!(url.path(), "/bigquery/v2/projects/p/queries");
    }

    #[test]
    fn test_query_body_uses_standard_sql_and_named_params() {
        let body = query_body(
            "SELECT ddl FROM `d.INFORMATION_SCHEMA.TABLES` WHERE table_name = @table_name",
            "EU",
            &[QueryParameter::string("table_name", "events")],
            "req-1",
        );
        assert_eq!(body["requestId"], json!("req-1"));
        assert_eq!(body["useLegacySql"], json!(false));
        assert_eq!(body["location"], json!("EU"));
        assert_eq!(body["formatOptions"]["useInt64Timestamp"], json!(true));
        assert_eq!(body["parameterMode"], json!("NAMED"));
        assert_eq!(
            body["queryParameters"][0],
            json!({
                "name": "table_name",
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": "events" },
            })
        );

        let plain = query_body("SELECT 1", "US", &[], "req-2");
        assert!(plain.get("queryParameters").is_none());
    }

    #[test]
    fn test_extracts_google_error_message() {
        let body = r#"{"error":{"code":400,"message":"Syntax error: Unexpected end of script at [1:7]","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            google_error_message(body).as_deref(),
            Some("Syntax error: Unexpected end of script at [1:7]")
        );
        assert!(google_error_message("<html>bad gateway</html>").is_none());
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let api = ApiConfig {
            base_url: "mailto:someone@example.com".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        assert!(RestConnector::new(&api).is_err());
    }
}
