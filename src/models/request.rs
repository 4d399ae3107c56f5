//! The `ask_videx` request/response wire shapes (§6). The optimizer's payload is a
//! self-describing nested record rather than a fixed schema per request kind, so the wire
//! type (`RequestRecord`) stays loosely typed; everything downstream of it is parsed into the
//! explicit, validated types below before a handler ever sees it, per the "replace runtime
//! reflection with an explicit sum type" design note in §9.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EstimatorError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestProperties {
    #[serde(default)]
    pub dbname: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub target_storage_engine: Option<String>,
    #[serde(default)]
    pub videx_options: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key_length: Option<u32>,
    #[serde(default)]
    pub store_length: Option<u32>,
}

/// The raw, self-describing record the optimizer sends: `{item_type, properties, data[]}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestRecord {
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub properties: RequestProperties,
    #[serde(default)]
    pub data: Vec<RequestRecord>,
}

/// A decoded `videx_options` JSON blob.
#[derive(Debug, Clone, Default)]
pub struct VidexOptions {
    pub task_id: Option<String>,
    pub use_gt: bool,
}

pub fn parse_videx_options(raw: Option<&str>) -> VidexOptions {
    let Some(raw) = raw else {
        return VidexOptions::default();
    };
    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return VidexOptions::default(),
    };
    VidexOptions {
        task_id: parsed.get("task_id").and_then(|v| v.as_str()).map(String::from),
        use_gt: parsed.get("use_gt").and_then(|v| v.as_bool()).unwrap_or(false),
    }
}

/// A `column_and_bound` leaf: `{properties: {column, value}}`.
#[derive(Debug, Clone)]
pub struct ColumnBound {
    pub column: String,
    pub value: String,
}

pub fn parse_column_bound(rec: &RequestRecord) -> Result<ColumnBound> {
    let column = rec
        .properties
        .column
        .clone()
        .ok_or_else(|| EstimatorError::ValidationError("column_and_bound missing column".into()))?;
    let value = rec
        .properties
        .value
        .clone()
        .ok_or_else(|| EstimatorError::ValidationError("column_and_bound missing value".into()))?;
    Ok(ColumnBound { column, value })
}

/// A `min_key`/`max_key` record: an operator plus the ordered list of column bounds.
#[derive(Debug, Clone)]
pub struct KeyBound {
    pub index_name: Option<String>,
    pub operator: Option<String>,
    pub bounds: Vec<ColumnBound>,
}

pub fn parse_key_bound(rec: &RequestRecord) -> Result<KeyBound> {
    let bounds = rec
        .data
        .iter()
        .map(parse_column_bound)
        .collect::<Result<Vec<_>>>()?;
    Ok(KeyBound {
        index_name: rec.properties.index_name.clone(),
        operator: rec.properties.operator.clone(),
        bounds,
    })
}

/// Finds the first nested record of a given `item_type`, e.g. `"min_key"`.
pub fn find_child<'a>(rec: &'a RequestRecord, item_type: &str) -> Option<&'a RequestRecord> {
    rec.data.iter().find(|r| r.item_type == item_type)
}

/// The uniform response envelope, per §4.8.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub code: u16,
    pub message: String,
    pub data: HashMap<String, String>,
}

impl ResponseEnvelope {
    pub fn ok(data: HashMap<String, String>) -> Self {
        ResponseEnvelope {
            code: 200,
            message: "ok".to_string(),
            data,
        }
    }

    pub fn ok_single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value.into());
        Self::ok(data)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        ResponseEnvelope {
            code: 200,
            message: message.into(),
            data: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_videx_options_with_defaults() {
        let opts = parse_videx_options(None);
        assert!(!opts.use_gt);
        assert!(opts.task_id.is_none());

        let opts = parse_videx_options(Some(r#"{"task_id": "t1", "use_gt": true}"#));
        assert_eq!(opts.task_id.as_deref(), Some("t1"));
        assert!(opts.use_gt);
    }

    #[test]
    fn malformed_videx_options_degrades_to_defaults() {
        let opts = parse_videx_options(Some("not json"));
        assert!(!opts.use_gt);
    }
}
