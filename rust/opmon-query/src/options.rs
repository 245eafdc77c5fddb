//! Maps an editor field to the backend resource that lists its options.

use crate::{
    error::{Result, ServiceError},
    frames::SelectableOption,
    model::{defaults, Query, QueryMode},
    pattern::normalize_value,
    variables::Scope,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// A selector whose options come from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Host,
    Service,
    Hostgroup,
    Servicegroup,
    ServiceCatalog,
    Metric,
    /// Metric names requested by label editors. Same resource as [`Field::Metric`].
    Label,
    TimeCut,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Host,
        Field::Service,
        Field::Hostgroup,
        Field::Servicegroup,
        Field::ServiceCatalog,
        Field::Metric,
        Field::Label,
        Field::TimeCut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Host => "host",
            Field::Service => "service",
            Field::Hostgroup => "hostgroup",
            Field::Servicegroup => "servicegroup",
            Field::ServiceCatalog => "serviceCatalog",
            Field::Metric => "metric",
            Field::Label => "label",
            Field::TimeCut => "timeCut",
        }
    }

    pub fn resource(&self) -> Resource {
        match self {
            Field::Host => Resource::Hosts,
            Field::Service => Resource::Services,
            Field::Metric | Field::Label => Resource::Metrics,
            Field::TimeCut => Resource::TimeCuts,
            Field::Hostgroup => Resource::Hostgroup,
            Field::Servicegroup => Resource::Servicegroup,
            Field::ServiceCatalog => Resource::ServiceCatalog,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ServiceError;

    /// Accepts both the object-type names and the editor's field names.
    fn from_str(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != '_' && *ch != '-')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "host" | "hosts" => Ok(Field::Host),
            "service" | "services" => Ok(Field::Service),
            "hostgroup" => Ok(Field::Hostgroup),
            "servicegroup" => Ok(Field::Servicegroup),
            "servicecatalog" | "catalog" => Ok(Field::ServiceCatalog),
            "metric" | "metrics" => Ok(Field::Metric),
            "label" => Ok(Field::Label),
            "timecut" | "timecuts" => Ok(Field::TimeCut),
            _ => Err(ServiceError::UnknownField(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Hosts,
    Services,
    Metrics,
    TimeCuts,
    Hostgroup,
    Servicegroup,
    ServiceCatalog,
}

impl Resource {
    /// Path segment appended to the data source URL.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Hosts => "hosts",
            Resource::Services => "services",
            Resource::Metrics => "metrics",
            Resource::TimeCuts => "timecuts",
            Resource::Hostgroup => "hostgroup",
            Resource::Servicegroup => "servicegroup",
            Resource::ServiceCatalog => "serviceCatalog",
        }
    }
}

/// Everything needed to POST an option fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub resource: Resource,
    pub payload: Value,
}

fn resolved(value: Option<&str>, scope: &Scope) -> Option<String> {
    value.map(|value| normalize_value(&scope.resolve(value)))
}

/// Resolves `field` to its resource and builds the payload from the current query.
///
/// The query is copied; the caller's value is never modified.
pub fn resource_request(field: Field, query: &Query, scope: &Scope) -> ResourceRequest {
    let mut payload = query.clone();

    match field {
        Field::Service => {
            payload.host = resolved(query.host.as_deref(), scope);
        }
        Field::Metric | Field::Label => {
            let mode = query.mode_or_default();
            if mode == QueryMode::System {
                payload.host = Some(String::new());
                payload.service = Some(String::new());
            } else {
                payload.host = resolved(query.host.as_deref(), scope);
                payload.service = resolved(query.service.as_deref(), scope);
            }
            payload.object_type = Some(query.object_type.unwrap_or(defaults::OBJECT_TYPE));
            payload.mode = Some(mode);
        }
        Field::Host
        | Field::Hostgroup
        | Field::Servicegroup
        | Field::ServiceCatalog
        | Field::TimeCut => {}
    }

    ResourceRequest {
        resource: field.resource(),
        payload: serde_json::to_value(&payload).unwrap_or(Value::Null),
    }
}

/// Orders a fetched list for display.
///
/// The metric field starts with its "no selection" entry, followed by one placeholder
/// per declared variable and then the backend's entries in the order they arrived.
pub fn finalize_options(
    field: Field,
    scope: &Scope,
    fetched: Vec<SelectableOption>,
) -> Vec<SelectableOption> {
    let mut options = Vec::with_capacity(fetched.len() + scope.variables().len() + 1);

    if field == Field::Metric {
        options.push(SelectableOption::same(defaults::METRIC));
    }
    options.extend(
        scope
            .variables()
            .iter()
            .map(|variable| SelectableOption::same(variable.placeholder())),
    );
    options.extend(fetched);
    options
}
