//! Selector lists and dependent-field rules of the query builder.

use crate::{
    frames::SelectableOption,
    model::{defaults, GroupBy, ObjectType, Query, QueryMode, ResultFormat},
    normalize::with_defaults,
    options::Field,
};
use serde::{Deserialize, Serialize};

/// A labelled entry whose value is not necessarily a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice<T> {
    pub label: String,
    pub value: T,
}

/// Object types the builder offers under `mode`.
pub fn object_type_options(mode: QueryMode) -> Vec<ObjectType> {
    ObjectType::ALL
        .into_iter()
        .filter(|object_type| match mode {
            QueryMode::Availability | QueryMode::Status => *object_type != ObjectType::System,
            QueryMode::Capacity => matches!(
                object_type,
                ObjectType::Service | ObjectType::Hostgroup | ObjectType::Servicegroup
            ),
            QueryMode::System => *object_type != ObjectType::ServiceCatalog,
        })
        .collect()
}

pub fn query_mode_options() -> Vec<Choice<QueryMode>> {
    QueryMode::ALL
        .into_iter()
        .map(|mode| Choice {
            label: mode.label().to_string(),
            value: mode,
        })
        .collect()
}

pub fn group_by_options() -> Vec<SelectableOption> {
    GroupBy::ALL
        .iter()
        .map(|group_by| SelectableOption::same(group_by.as_str()))
        .collect()
}

pub fn result_format_options() -> Vec<SelectableOption> {
    [ResultFormat::TimeSeries, ResultFormat::Table]
        .into_iter()
        .map(|format| SelectableOption {
            label: format.label().to_string(),
            value: format.as_str().to_string(),
        })
        .collect()
}

/// Selectors shown for the query's object type, in display order.
pub fn visible_fields(query: &Query) -> Vec<Field> {
    let object_type = query.object_type.unwrap_or(defaults::OBJECT_TYPE);
    let mut fields = match object_type {
        ObjectType::Hostgroup => vec![Field::Hostgroup],
        ObjectType::Servicegroup => vec![Field::Servicegroup],
        ObjectType::ServiceCatalog => vec![Field::ServiceCatalog],
        _ => Vec::new(),
    };
    fields.push(Field::Host);
    if !matches!(object_type, ObjectType::Host | ObjectType::ServiceCatalog) {
        fields.push(Field::Service);
    }
    fields.push(Field::Metric);
    fields.push(Field::TimeCut);
    fields
}

/// Fetches issued when an editor opens on `query`.
pub fn initial_fetches(query: &Query) -> Vec<Field> {
    let mut fields = vec![Field::Host];
    match query.object_type.unwrap_or(defaults::OBJECT_TYPE) {
        ObjectType::Service => fields.push(Field::Service),
        ObjectType::Hostgroup => fields.push(Field::Hostgroup),
        ObjectType::Servicegroup => fields.push(Field::Servicegroup),
        ObjectType::ServiceCatalog => fields.push(Field::ServiceCatalog),
        ObjectType::Host | ObjectType::System => {}
    }
    fields.push(Field::TimeCut);
    fields
}

/// One edit made in the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldChange {
    Mode(QueryMode),
    ObjectType(ObjectType),
    Host(String),
    Service(String),
    Hostgroup(String),
    Servicegroup(String),
    ServiceCatalog(String),
    Metric(String),
    TimeCut(String),
    GroupBy(GroupBy),
    ResultFormat(ResultFormat),
    HardState(bool),
    ExtendedState(bool),
    DowntimeAsOk(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorUpdate {
    pub query: Query,
    /// Option slots whose contents no longer match the query.
    pub clear: Vec<Field>,
}

/// Applies `change` to a copy of `query` with its defaults filled in.
pub fn apply_change(query: &Query, change: FieldChange) -> EditorUpdate {
    let mut query = with_defaults(query);
    let mut clear = Vec::new();

    match change {
        FieldChange::Mode(mode) => {
            if mode == QueryMode::Capacity && query.object_type == Some(ObjectType::Host) {
                query.object_type = Some(ObjectType::Service);
            }
            query.mode = Some(mode);
        }
        FieldChange::ObjectType(object_type) => query.object_type = Some(object_type),
        FieldChange::Host(host) => {
            query.host = Some(host);
            query.service = Some(defaults::SERVICE.to_string());
            clear.push(Field::Service);
        }
        FieldChange::Service(service) => query.service = Some(service),
        FieldChange::Hostgroup(hostgroup) => {
            query.hostgroup = Some(hostgroup);
            reset_host_and_service(&mut query, &mut clear);
        }
        FieldChange::Servicegroup(servicegroup) => {
            query.servicegroup = Some(servicegroup);
            reset_host_and_service(&mut query, &mut clear);
        }
        FieldChange::ServiceCatalog(catalog) => query.service_catalog = Some(catalog),
        FieldChange::Metric(metric) => query.metric = Some(metric),
        FieldChange::TimeCut(time_cut) => query.time_cut = Some(time_cut),
        FieldChange::GroupBy(group_by) => query.group_by = Some(group_by),
        FieldChange::ResultFormat(format) => query.result_format = Some(format),
        FieldChange::HardState(flag) => query.hard_state = Some(flag),
        FieldChange::ExtendedState(flag) => query.extended_state = Some(flag),
        FieldChange::DowntimeAsOk(flag) => query.downtime_as_ok = Some(flag),
    }

    EditorUpdate { query, clear }
}

fn reset_host_and_service(query: &mut Query, clear: &mut Vec<Field>) {
    query.host = Some(defaults::HOST.to_string());
    query.service = Some(defaults::SERVICE.to_string());
    clear.extend([Field::Host, Field::Service]);
}
