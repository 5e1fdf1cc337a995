use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::types::{ColumnSchema, ColumnType, Row};

/// Encodes a validated record into a [`Row`] shaped by the table's columns.
///
/// Values whose column is known are converted to the representation the store expects.
/// Fields with no column are copied unchanged so that the store decides whether to accept
/// them. Encoding never fails: a value that cannot be converted is passed through as is.
pub fn encode_record(record: &Map<String, Value>, columns: &[ColumnSchema]) -> Row {
    record
        .iter()
        .map(|(name, value)| {
            let encoded = match columns.iter().find(|column| column.name == *name) {
                Some(column) => encode_value(value, column),
                None => value.clone(),
            };

            (name.clone(), encoded)
        })
        .collect()
}

/// Encodes a single value for `column`, following its mode.
pub fn encode_value(value: &Value, column: &ColumnSchema) -> Value {
    if !column.is_repeated() {
        return encode_element(value, column);
    }

    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(elements) => Value::Array(
            elements
                .iter()
                .map(|element| encode_element(element, column))
                .collect(),
        ),
        single => Value::Array(vec![encode_element(single, column)]),
    }
}

fn encode_element(value: &Value, column: &ColumnSchema) -> Value {
    match (column.typ, value) {
        (_, Value::Null) => Value::Null,
        (ColumnType::Record, Value::Object(map)) => {
            Value::Object(encode_record(map, &column.children))
        }
        (ColumnType::Timestamp, Value::String(string)) => normalize_timestamp(string)
            .map(Value::String)
            .unwrap_or_else(|| value.clone()),
        (ColumnType::String, Value::String(_)) => value.clone(),
        (ColumnType::String, other) => Value::String(other.to_string()),
        _ => value.clone(),
    }
}

/// Normalizes an RFC 3339 timestamp to UTC with microsecond precision.
///
/// Returns `None` if `value` is not a valid RFC 3339 timestamp.
pub fn normalize_timestamp(value: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(value).ok().map(|timestamp| {
        timestamp
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    })
}
