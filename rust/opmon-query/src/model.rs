//! Query model shared by the normalizer, the batch processor and the option dispatcher.
//!
//! Field names on the wire follow the OpMon connector (`objecttype`, `resultformat`,
//! `hardState`, ...). The camelCase spellings used by panel JSON are accepted too.

use crate::variables::ScopedValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};

/// Placeholder values meaning "nothing explicitly selected".
pub mod defaults {
    use super::{GroupBy, ObjectType, QueryMode, ResultFormat};

    pub const HOST: &str = "- select host -";
    pub const SERVICE: &str = "- select service -";
    pub const METRIC: &str = "- all -";
    pub const TIME_CUT: &str = "24x7";
    pub const HOSTGROUP: &str = "- select hostgroup -";
    pub const SERVICEGROUP: &str = "- select servicegroup -";
    pub const SERVICE_CATALOG: &str = "- select service catalog -";
    pub const RESULT_FORMAT: ResultFormat = ResultFormat::TimeSeries;
    pub const OBJECT_TYPE: ObjectType = ObjectType::Host;
    pub const MODE: QueryMode = QueryMode::Availability;
    pub const GROUP_BY: GroupBy = GroupBy::None;
    pub const EXTENDED_STATE: bool = false;
    pub const DOWNTIME_AS_OK: bool = false;
    pub const HARD_STATE: bool = true;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QueryMode {
    #[default]
    Availability,
    Capacity,
    System,
    Status,
}

impl QueryMode {
    pub const ALL: [QueryMode; 4] = [
        QueryMode::Availability,
        QueryMode::Capacity,
        QueryMode::System,
        QueryMode::Status,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QueryMode::Availability => "Availability",
            QueryMode::Capacity => "Capacity",
            QueryMode::System => "System",
            QueryMode::Status => "Status",
        }
    }
}

impl TryFrom<u8> for QueryMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QueryMode::Availability),
            1 => Ok(QueryMode::Capacity),
            2 => Ok(QueryMode::System),
            3 => Ok(QueryMode::Status),
            other => Err(format!("unsupported query mode {other}")),
        }
    }
}

impl From<QueryMode> for u8 {
    fn from(mode: QueryMode) -> Self {
        match mode {
            QueryMode::Availability => 0,
            QueryMode::Capacity => 1,
            QueryMode::System => 2,
            QueryMode::Status => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Host,
    Service,
    Hostgroup,
    Servicegroup,
    #[serde(rename = "Service catalog")]
    ServiceCatalog,
    System,
}

impl ObjectType {
    pub const ALL: [ObjectType; 6] = [
        ObjectType::Host,
        ObjectType::Service,
        ObjectType::Hostgroup,
        ObjectType::Servicegroup,
        ObjectType::ServiceCatalog,
        ObjectType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Host => "Host",
            ObjectType::Service => "Service",
            ObjectType::Hostgroup => "Hostgroup",
            ObjectType::Servicegroup => "Servicegroup",
            ObjectType::ServiceCatalog => "Service catalog",
            ObjectType::System => "System",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    #[default]
    TimeSeries,
    Table,
}

impl ResultFormat {
    pub fn label(&self) -> &'static str {
        match self {
            ResultFormat::TimeSeries => "Time series",
            ResultFormat::Table => "Table",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::TimeSeries => "time_series",
            ResultFormat::Table => "table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    None,
    Avg,
    Max,
    Min,
    Sum,
}

impl GroupBy {
    pub const ALL: [GroupBy; 5] = [
        GroupBy::None,
        GroupBy::Avg,
        GroupBy::Max,
        GroupBy::Min,
        GroupBy::Sum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::None => "none",
            GroupBy::Avg => "avg",
            GroupBy::Max => "max",
            GroupBy::Min => "min",
            GroupBy::Sum => "sum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    #[default]
    Code,
    Builder,
}

/// The six string fields that select monitored objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    Host,
    Service,
    Hostgroup,
    Servicegroup,
    ServiceCatalog,
    Metric,
}

impl FilterField {
    pub const ALL: [FilterField; 6] = [
        FilterField::Host,
        FilterField::Service,
        FilterField::Hostgroup,
        FilterField::Servicegroup,
        FilterField::ServiceCatalog,
        FilterField::Metric,
    ];

    pub fn default_value(&self) -> &'static str {
        match self {
            FilterField::Host => defaults::HOST,
            FilterField::Service => defaults::SERVICE,
            FilterField::Hostgroup => defaults::HOSTGROUP,
            FilterField::Servicegroup => defaults::SERVICEGROUP,
            FilterField::ServiceCatalog => defaults::SERVICE_CATALOG,
            FilterField::Metric => defaults::METRIC,
        }
    }
}

/// One panel target as composed by the editor. Every selection may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "QueryWire")]
pub struct Query {
    #[serde(rename = "refId", skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(rename = "hide")]
    pub disabled: bool,
    #[serde(rename = "editorMode", skip_serializing_if = "Option::is_none")]
    pub editor_mode: Option<EditorMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Free-form target typed in the code editor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<QueryMode>,
    #[serde(rename = "objecttype", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<ObjectType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servicegroup: Option<String>,
    #[serde(rename = "serviceCatalog", skip_serializing_if = "Option::is_none")]
    pub service_catalog: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(rename = "timeCut", skip_serializing_if = "Option::is_none")]
    pub time_cut: Option<String>,
    #[serde(rename = "resultformat", skip_serializing_if = "Option::is_none")]
    pub result_format: Option<ResultFormat>,
    #[serde(rename = "groupby", skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(rename = "hardState", skip_serializing_if = "Option::is_none")]
    pub hard_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_state: Option<bool>,
    #[serde(rename = "downtimeasok", skip_serializing_if = "Option::is_none")]
    pub downtime_as_ok: Option<bool>,
}

/// Incoming shape of a [`Query`]. Panels may carry both spellings of a field; the
/// connector spelling wins.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryWire {
    #[serde(rename = "refId")]
    ref_id: Option<String>,
    hide: Option<bool>,
    disabled: Option<bool>,
    #[serde(rename = "editorMode")]
    editor_mode: Option<EditorMode>,
    alias: Option<String>,
    target: Option<String>,
    mode: Option<QueryMode>,
    objecttype: Option<ObjectType>,
    #[serde(rename = "objectType")]
    object_type: Option<ObjectType>,
    host: Option<String>,
    service: Option<String>,
    hostgroup: Option<String>,
    servicegroup: Option<String>,
    #[serde(rename = "serviceCatalog")]
    service_catalog: Option<String>,
    metric: Option<String>,
    #[serde(rename = "timeCut")]
    time_cut: Option<String>,
    resultformat: Option<ResultFormat>,
    #[serde(rename = "resultFormat")]
    result_format: Option<ResultFormat>,
    groupby: Option<GroupBy>,
    #[serde(rename = "groupBy")]
    group_by: Option<GroupBy>,
    #[serde(rename = "hardState")]
    hard_state: Option<bool>,
    #[serde(rename = "hardStateOnly")]
    hard_state_only: Option<bool>,
    extended_state: Option<bool>,
    #[serde(rename = "extendedState")]
    extended_state_camel: Option<bool>,
    downtimeasok: Option<bool>,
    #[serde(rename = "downtimeAsOk")]
    downtime_as_ok: Option<bool>,
}

impl From<QueryWire> for Query {
    fn from(wire: QueryWire) -> Self {
        Self {
            ref_id: wire.ref_id,
            disabled: wire.hide.or(wire.disabled).unwrap_or(false),
            editor_mode: wire.editor_mode,
            alias: wire.alias,
            target: wire.target,
            mode: wire.mode,
            object_type: wire.objecttype.or(wire.object_type),
            host: wire.host,
            service: wire.service,
            hostgroup: wire.hostgroup,
            servicegroup: wire.servicegroup,
            service_catalog: wire.service_catalog,
            metric: wire.metric,
            time_cut: wire.time_cut,
            result_format: wire.resultformat.or(wire.result_format),
            group_by: wire.groupby.or(wire.group_by),
            hard_state: wire.hard_state.or(wire.hard_state_only),
            extended_state: wire.extended_state.or(wire.extended_state_camel),
            downtime_as_ok: wire.downtimeasok.or(wire.downtime_as_ok),
        }
    }
}

impl Query {
    pub fn filter_value(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::Host => self.host.as_deref(),
            FilterField::Service => self.service.as_deref(),
            FilterField::Hostgroup => self.hostgroup.as_deref(),
            FilterField::Servicegroup => self.servicegroup.as_deref(),
            FilterField::ServiceCatalog => self.service_catalog.as_deref(),
            FilterField::Metric => self.metric.as_deref(),
        }
    }

    /// The filterable fields that are absent or empty.
    pub fn missing_fields(&self) -> Vec<FilterField> {
        FilterField::ALL
            .into_iter()
            .filter(|field| self.filter_value(*field).map_or(true, str::is_empty))
            .collect()
    }

    pub fn mode_or_default(&self) -> QueryMode {
        self.mode.unwrap_or(defaults::MODE)
    }
}

/// Canonical, backend-ready form of a [`Query`]. Always derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    #[serde(rename = "refId", default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(rename = "hide")]
    pub disabled: bool,
    #[serde(rename = "editorMode", default, skip_serializing_if = "Option::is_none")]
    pub editor_mode: Option<EditorMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub mode: QueryMode,
    #[serde(rename = "objecttype")]
    pub object_type: ObjectType,
    pub host: String,
    pub service: String,
    pub hostgroup: String,
    pub servicegroup: String,
    #[serde(rename = "serviceCatalog")]
    pub service_catalog: String,
    pub metric: String,
    #[serde(rename = "timeCut")]
    pub time_cut: String,
    #[serde(rename = "resultformat")]
    pub result_format: ResultFormat,
    #[serde(rename = "groupby")]
    pub group_by: GroupBy,
    #[serde(rename = "hardState")]
    pub hard_state: bool,
    pub extended_state: bool,
    #[serde(rename = "downtimeasok")]
    pub downtime_as_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// A batch of targets submitted for execution, plus its ambient context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub targets: Vec<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TimeRange>,
    #[serde(rename = "rangeRaw", default, skip_serializing_if = "Option::is_none")]
    pub range_raw: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(rename = "intervalMs", default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(rename = "maxDataPoints", default, skip_serializing_if = "Option::is_none")]
    pub max_data_points: Option<u64>,
    #[serde(rename = "scopedVars", default)]
    pub scoped_vars: BTreeMap<String, ScopedValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_accepts_panel_aliases() {
        let query: Query = serde_json::from_value(serde_json::json!({
            "refId": "A",
            "disabled": true,
            "mode": 1,
            "objectType": "Service catalog",
            "resultFormat": "table",
            "groupBy": "max",
            "hardStateOnly": false,
            "extendedState": true,
            "downtimeAsOk": true
        }))
        .unwrap();

        assert!(query.disabled);
        assert_eq!(query.mode, Some(QueryMode::Capacity));
        assert_eq!(query.object_type, Some(ObjectType::ServiceCatalog));
        assert_eq!(query.result_format, Some(ResultFormat::Table));
        assert_eq!(query.group_by, Some(GroupBy::Max));
        assert_eq!(query.hard_state, Some(false));
        assert_eq!(query.extended_state, Some(true));
        assert_eq!(query.downtime_as_ok, Some(true));
    }

    #[test]
    fn query_serializes_connector_field_names() {
        let query = Query {
            mode: Some(QueryMode::Status),
            object_type: Some(ObjectType::Hostgroup),
            service_catalog: Some("erp".into()),
            time_cut: Some("8x5".into()),
            ..Default::default()
        };

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["mode"], 3);
        assert_eq!(value["objecttype"], "Hostgroup");
        assert_eq!(value["serviceCatalog"], "erp");
        assert_eq!(value["timeCut"], "8x5");
        assert_eq!(value["hide"], false);
        assert!(value.get("host").is_none());
    }

    #[test]
    fn both_spellings_of_a_field_are_accepted() {
        let query: Query = serde_json::from_value(serde_json::json!({
            "hide": false,
            "disabled": true,
            "objecttype": "Service",
            "objectType": "Host",
            "groupby": "min",
            "groupBy": "max",
            "downtimeAsOk": true
        }))
        .unwrap();

        assert!(!query.disabled);
        assert_eq!(query.object_type, Some(ObjectType::Service));
        assert_eq!(query.group_by, Some(GroupBy::Min));
        assert_eq!(query.downtime_as_ok, Some(true));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let parsed = serde_json::from_value::<Query>(serde_json::json!({ "mode": 9 }));
        assert!(parsed.is_err());
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let query = Query {
            host: Some("web01".into()),
            service: Some(String::new()),
            ..Default::default()
        };

        let missing = query.missing_fields();
        assert!(!missing.contains(&FilterField::Host));
        assert!(missing.contains(&FilterField::Service));
        assert_eq!(missing.len(), 5);
    }
}
