//! Decoding of fetch-N row payloads.
//!
//! Legacy source drivers return pre-serialized rows from their fetch-N
//! primitive. Two wire encodings exist:
//!
//! - [`RowEncoding::List`]: a JSON array of values in column order
//! - [`RowEncoding::Struct`]: a JSON object keyed by source column label
//!
//! Both decode into the same [`Row`] for equivalent payloads.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::schema::SourceColumn;
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, TransferError};
use crate::typemap::SourceType;

/// Text marker the source uses for NULL in serialized rows.
pub const NULL_MARKER: &str = "\\N";

/// Wire encoding of a fetch-N row payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowEncoding {
    /// Positional JSON array.
    List,
    /// JSON object keyed by source column label.
    Struct,
}

/// Decode one serialized row against the result-set columns.
pub fn decode_row(encoding: RowEncoding, payload: &str, columns: &[SourceColumn]) -> Result<Row> {
    let value: Value = serde_json::from_str(payload).map_err(|e| {
        TransferError::source_error(format!("Unable to deserialize row from source: {}", e))
    })?;

    match (encoding, value) {
        (RowEncoding::List, Value::Array(items)) => decode_list(items, columns),
        (RowEncoding::Struct, Value::Object(fields)) => decode_struct(fields, columns),
        (encoding, other) => Err(TransferError::source_error(format!(
            "Row payload does not match {:?} encoding: {}",
            encoding,
            kind_of(&other)
        ))),
    }
}

/// Serialize a row into a payload of the given encoding.
///
/// Decimals travel as strings so no precision is lost; non-finite floats
/// become NULL.
pub fn encode_row(encoding: RowEncoding, row: &[SqlValue], columns: &[SourceColumn]) -> String {
    let values = row.iter().map(|v| match v {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F64(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Decimal(d) => Value::String(d.to_string()),
        SqlValue::Text(s) => Value::String(s.clone()),
    });

    let value = match encoding {
        RowEncoding::List => Value::Array(values.collect()),
        RowEncoding::Struct => Value::Object(
            columns
                .iter()
                .map(|c| c.name.clone())
                .zip(values)
                .collect(),
        ),
    };
    value.to_string()
}

fn decode_list(items: Vec<Value>, columns: &[SourceColumn]) -> Result<Row> {
    if items.len() != columns.len() {
        return Err(TransferError::source_error(format!(
            "Row has {} values but the result set has {} columns",
            items.len(),
            columns.len()
        )));
    }

    items
        .into_iter()
        .zip(columns)
        .map(|(value, column)| decode_value(value, column))
        .collect()
}

fn decode_struct(mut fields: Map<String, Value>, columns: &[SourceColumn]) -> Result<Row> {
    columns
        .iter()
        .map(|column| match fields.remove(&column.name) {
            Some(value) => decode_value(value, column),
            None => Err(TransferError::source_error(format!(
                "Row is missing field '{}'",
                column.name
            ))),
        })
        .collect()
}

/// Decode a single JSON value for a column.
fn decode_value(value: Value, column: &SourceColumn) -> Result<SqlValue> {
    let value = match value {
        Value::Null => return Ok(SqlValue::Null),
        Value::String(s) if s == NULL_MARKER => return Ok(SqlValue::Null),
        other => other,
    };

    let decoded = match (column.source_type, &value) {
        (SourceType::Boolean, Value::Bool(b)) => Some(SqlValue::Bool(*b)),
        (SourceType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(SqlValue::Bool(false)),
            Some(1) => Some(SqlValue::Bool(true)),
            _ => None,
        },
        (SourceType::Boolean, Value::String(s)) => parse_bool(s).map(SqlValue::Bool),

        (t, Value::Number(n)) if t.is_integral() => n.as_i64().map(SqlValue::I64),
        (t, Value::String(s)) if t.is_integral() => s.trim().parse().ok().map(SqlValue::I64),

        (SourceType::Float | SourceType::Real | SourceType::Double, Value::Number(n)) => {
            n.as_f64().map(SqlValue::F64)
        }
        (SourceType::Float | SourceType::Real | SourceType::Double, Value::String(s)) => {
            s.trim().parse().ok().map(SqlValue::F64)
        }

        (SourceType::Decimal | SourceType::Numeric, Value::Number(n)) => {
            parse_decimal(&n.to_string()).map(SqlValue::Decimal)
        }
        (SourceType::Decimal | SourceType::Numeric, Value::String(s)) => {
            parse_decimal(s.trim()).map(SqlValue::Decimal)
        }

        (SourceType::Varchar, Value::String(s)) => Some(SqlValue::Text(s.clone())),
        (SourceType::Varchar, Value::Number(n)) => Some(SqlValue::Text(n.to_string())),
        (SourceType::Varchar, Value::Bool(b)) => Some(SqlValue::Text(b.to_string())),

        _ => None,
    };

    decoded.ok_or_else(|| {
        TransferError::source_error(format!(
            "Cannot decode {} as {:?} for column '{}'",
            kind_of(&value),
            column.source_type,
            column.name
        ))
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Numbers keep their literal text (`arbitrary_precision`), so both JSON
/// numbers and numeric strings parse without a round trip through `f64`.
/// Values that do not fit exactly are rejected rather than rounded.
fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str_exact(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
