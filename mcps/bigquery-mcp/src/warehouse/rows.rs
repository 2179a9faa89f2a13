//! Decoding of BigQuery REST row payloads
//!
//! The API returns every cell as a string inside `{"f": [{"v": ...}]}`
//! envelopes; the schema says how to interpret each one.

use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::{Number, Value};

use super::Row;
use crate::error::WarehouseError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    /// Sub-fields of a RECORD/STRUCT
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("REPEATED"))
    }
}

pub fn decode_rows(schema: &TableSchema, rows: &[Value]) -> Result<Vec<Row>, WarehouseError> {
    rows.iter()
        .map(|row| decode_record(&schema.fields, row))
        .collect()
}

fn decode_record(fields: &[FieldSchema], record: &Value) -> Result<Row, WarehouseError> {
    let cells = record
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| WarehouseError::Decode(format!("row is not a record: {record}")))?;
    if cells.len() != fields.len() {
        return Err(WarehouseError::Decode(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut row = Row::new();
    for (field, cell) in fields.iter().zip(cells) {
        let raw = cell.get("v").unwrap_or(&Value::Null);
        row.insert(field.name.clone(), decode_field(field, raw)?);
    }
    Ok(row)
}

fn decode_field(field: &FieldSchema, raw: &Value) -> Result<Value, WarehouseError> {
    if !field.is_repeated() {
        return decode_value(field, raw);
    }
    match raw {
        Value::Null => Ok(Value::Array(Vec::new())),
        Value::Array(items) => items
            .iter()
            .map(|item| decode_value(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Err(mismatch(field, other)),
    }
}

fn decode_value(field: &FieldSchema, raw: &Value) -> Result<Value, WarehouseError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type.to_ascii_uppercase().as_str() {
        "RECORD" | "STRUCT" => decode_record(&field.fields, raw).map(Value::Object),
        "INTEGER" | "INT64" => {
            let text = as_text(field, raw)?;
            text.parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch(field, raw))
        }
        "FLOAT" | "FLOAT64" => {
            let text = as_text(field, raw)?;
            let parsed = text.parse::<f64>().map_err(|_| mismatch(field, raw))?;
            // NaN and infinities have no JSON number form
            Ok(Number::from_f64(parsed)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(text.to_string())))
        }
        "BOOLEAN" | "BOOL" => match as_text(field, raw)?.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(field, raw)),
        },
        "TIMESTAMP" => decode_timestamp(field, raw),
        _ => Ok(match raw {
            Value::String(_) => raw.clone(),
            other => Value::String(other.to_string()),
        }),
    }
}

/// Microseconds since the epoch (`useInt64Timestamp`), or float seconds
/// from older response formats
fn decode_timestamp(field: &FieldSchema, raw: &Value) -> Result<Value, WarehouseError> {
    let text = as_text(field, raw)?;
    let micros = match text.parse::<i64>() {
        Ok(micros) => micros,
        Err(_) => {
            let seconds = text.parse::<f64>().map_err(|_| mismatch(field, raw))?;
            (seconds * 1_000_000.0).round() as i64
        }
    };
    DateTime::from_timestamp_micros(micros)
        .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        .ok_or_else(|| mismatch(field, raw))
}

fn as_text<'a>(field: &FieldSchema, raw: &'a Value) -> Result<&'a str, WarehouseError> {
    raw.as_str().ok_or_else(|| mismatch(field, raw))
}

fn mismatch(field: &FieldSchema, raw: &Value) -> WarehouseError {
    WarehouseError::Decode(format!(
        "field {} of type {} has unexpected value {raw}",
        field.name, field.field_type
    ))
}
