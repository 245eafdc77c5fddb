//! Typed views over the rows the backend returns.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectableOption {
    pub label: String,
    pub value: String,
}

impl SelectableOption {
    pub fn same(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Option rows are either bare scalars or `{text, value}` objects; both label and value
/// take the text.
pub fn map_to_label_value(rows: &[Value]) -> Vec<SelectableOption> {
    rows.iter()
        .filter_map(|row| match row {
            Value::Object(map) => map
                .get("text")
                .and_then(scalar_text)
                .or_else(|| Some(row.to_string())),
            Value::Null => None,
            other => scalar_text(other),
        })
        .map(SelectableOption::same)
        .collect()
}

/// Result of a variable query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFindValue {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

pub fn transform_metric_find_response(rows: &[Value]) -> Vec<MetricFindValue> {
    rows.iter()
        .filter_map(|row| match row {
            Value::Object(map) => {
                let value = map.get("value").cloned();
                let text = map
                    .get("text")
                    .and_then(scalar_text)
                    .or_else(|| value.as_ref().and_then(scalar_text))?;
                Some(MetricFindValue { text, value })
            }
            other => scalar_text(other).map(|text| MetricFindValue { text, value: None }),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagKey {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValue {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// A `[value, timestamp_ms]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Option<f64>, f64)", into = "(Option<f64>, f64)")]
pub struct Datapoint {
    pub value: Option<f64>,
    pub timestamp_ms: i64,
}

impl From<(Option<f64>, f64)> for Datapoint {
    fn from((value, timestamp): (Option<f64>, f64)) -> Self {
        Self {
            value,
            timestamp_ms: timestamp as i64,
        }
    }
}

impl From<Datapoint> for (Option<f64>, f64) {
    fn from(point: Datapoint) -> Self {
        (point.value, point.timestamp_ms as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn table_kind() -> String {
    "table".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFrame {
    #[serde(rename = "type", default = "table_kind")]
    pub kind: String,
    #[serde(rename = "refId", default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFrame {
    #[serde(rename = "refId", default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    pub target: String,
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataFrame {
    Table(TableFrame),
    TimeSeries(SeriesFrame),
}

/// Types the rows returned by `<base>/query`. A missing first row means no data.
pub fn parse_frames(rows: Vec<Value>) -> Result<Vec<DataFrame>> {
    match rows.first() {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(_) => {}
    }

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<DataFrame>(row).map_err(|err| {
                ServiceError::InvalidResponse(format!("row {index} is not a frame: {err}"))
            })
        })
        .collect()
}
