//! Tool parameter types
//!
//! These only describe the input schemas advertised by `list_tools`;
//! arguments are checked individually by the dispatcher so that a bad
//! request gets a precise message instead of a deserialization error.

use std::sync::Arc;

use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

/// Parameters for execute-query
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// SELECT SQL query to execute using BigQuery dialect
    pub query: String,
}

/// Parameters for describe-table
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    /// Name of the table to describe (e.g. my_dataset.my_table)
    pub table_name: String,
}

/// list-tables and reauth-oauth take no arguments
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

/// JSON schema for `T` as an MCP tool input schema
pub fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let mut object = match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(object)) => object,
        _ => JsonObject::new(),
    };
    object.remove("$schema");
    object.remove("title");
    object.entry("type").or_insert_with(|| json!("object"));
    Arc::new(object)
}
