//! Operations exposed to the UI, wired to a [`Backend`].

use crate::{
    backend::{into_rows, Backend, HealthProbe},
    batch::{self, BackendRequest},
    error::{Result, ServiceError},
    frames::{
        map_to_label_value, parse_frames, transform_metric_find_response, DataFrame,
        MetricFindValue, SelectableOption, TagKey, TagValue,
    },
    model::{NormalizedQuery, Query, QueryRequest, TimeRange},
    normalize,
    options::{finalize_options, resource_request, Field},
    session::OptionSlots,
    variables::{InterpolationFormat, Scope, VariableSource},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const NOT_WORKING: &str = "Data source is not working";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Vec<DataFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceStatus {
    pub status: String,
    pub message: String,
    pub title: String,
}

impl DataSourceStatus {
    fn success() -> Self {
        Self {
            status: "success".into(),
            message: "Data source is working".into(),
            title: "Success".into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
            title: "Error".into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableQueryFormat {
    #[default]
    String,
    Json,
}

/// Definition of a query-kind template variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableQuery {
    pub query: String,
    #[serde(default)]
    pub format: VariableQueryFormat,
}

/// Time context forwarded with a variable query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableQueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<TimeRange>,
    #[serde(rename = "rangeRaw", default, skip_serializing_if = "Option::is_none")]
    pub range_raw: Option<Value>,
}

#[derive(Clone)]
pub struct DataSource {
    backend: Arc<dyn Backend>,
    name: String,
}

impl DataSource {
    pub fn new(backend: Arc<dyn Backend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshots `source` into the scope used by every other operation.
    pub fn scope(&self, source: &dyn VariableSource) -> Scope {
        Scope::from_source(source, &self.name)
    }

    pub fn normalize_query(&self, query: &Query, scope: &Scope) -> NormalizedQuery {
        normalize::normalize_query(query, scope)
    }

    pub fn build_request(&self, request: &QueryRequest, scope: &Scope) -> BackendRequest {
        batch::build_request(request, scope)
    }

    /// Executes a batch. Always returns a determinate outcome; failures land in `error`.
    pub async fn query(&self, request: &QueryRequest, scope: &Scope) -> QueryResponse {
        let outbound = self.build_request(request, scope);
        if outbound.is_empty() {
            debug!("no target qualified, skipping backend call");
            return QueryResponse::default();
        }

        let result = match self.backend.execute(&outbound).await {
            Ok(rows) => parse_frames(rows),
            Err(err) => Err(err),
        };

        match result {
            Ok(data) => QueryResponse { data, error: None },
            Err(err) => {
                warn!(error = %err, targets = outbound.targets.len(), "query execution failed");
                QueryResponse {
                    data: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    pub async fn fetch_field_options(
        &self,
        field: Field,
        query: &Query,
        scope: &Scope,
    ) -> Result<Vec<SelectableOption>> {
        let request = resource_request(field, query, scope);
        debug!(%field, resource = request.resource.name(), "fetching options");

        let rows = self
            .backend
            .fetch_options(request.resource, &request.payload)
            .await?;
        Ok(finalize_options(field, scope, map_to_label_value(&rows)))
    }

    /// Fetches `field` into its slot. Returns whether the result was applied.
    pub async fn refresh_options(
        &self,
        slots: &OptionSlots,
        field: Field,
        query: &Query,
        scope: &Scope,
    ) -> Result<bool> {
        let ticket = slots.begin(field);
        match self.fetch_field_options(field, query, scope).await {
            Ok(options) => Ok(slots.complete(ticket, options)),
            Err(err) => {
                slots.abandon(ticket);
                Err(err)
            }
        }
    }

    /// Same as [`DataSource::fetch_field_options`] for an untyped identifier.
    pub async fn fetch_field_options_by_name(
        &self,
        field: &str,
        query: &Query,
        scope: &Scope,
    ) -> Result<Vec<SelectableOption>> {
        let field = field.parse::<Field>().map_err(|err| {
            warn!(field = %field, "unknown option field");
            err
        })?;
        self.fetch_field_options(field, query, scope).await
    }

    /// Resolves a query-kind variable through `<base>/variable`.
    pub async fn metric_find_query(
        &self,
        variable: &VariableQuery,
        options: &VariableQueryOptions,
        kind: Option<&str>,
        scope: &Scope,
    ) -> Result<Vec<MetricFindValue>> {
        let payload = match variable.format {
            VariableQueryFormat::Json => {
                let interpolated = scope.interpolate(&variable.query, InterpolationFormat::Json);
                serde_json::from_str::<Value>(&interpolated).map_err(|err| {
                    ServiceError::InvalidRequest(format!("variable query is not JSON: {err}"))
                })?
            }
            VariableQueryFormat::String => json!({
                "type": kind,
                "target": scope.interpolate(&variable.query, InterpolationFormat::Regex),
            }),
        };

        let body = json!({
            "payload": payload,
            "range": options.range,
            "rangeRaw": options.range_raw,
        });
        let rows = into_rows(self.backend.call("variable", &body).await?)?;
        Ok(transform_metric_find_response(&rows))
    }

    pub async fn tag_keys(&self, options: &Value) -> Result<Vec<TagKey>> {
        let rows = into_rows(self.backend.call("tag-keys", options).await?)?;
        typed_rows(rows, |text| TagKey {
            text,
            key: None,
            kind: None,
        })
    }

    pub async fn tag_values(&self, options: &Value) -> Result<Vec<TagValue>> {
        let rows = into_rows(self.backend.call("tag-values", options).await?)?;
        typed_rows(rows, |text| TagValue { text, key: None })
    }

    pub async fn test_datasource(&self) -> DataSourceStatus {
        match self.backend.health().await {
            Ok(probe) => probe_status(probe),
            Err(ServiceError::Backend { message, .. }) => {
                DataSourceStatus::error(format!("{NOT_WORKING}: {message}"))
            }
            Err(err) => DataSourceStatus::error(format!("{NOT_WORKING}: {err}")),
        }
    }
}

fn probe_status(probe: HealthProbe) -> DataSourceStatus {
    if probe.status == 200 {
        return DataSourceStatus::success();
    }

    let mut message = probe
        .status_text
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NOT_WORKING.to_string());

    let detail = probe
        .body
        .as_ref()
        .and_then(|body| body.get("error"))
        .filter(|error| error.get("code").is_some_and(|code| !code.is_null()));
    if let Some(error) = detail {
        message.push_str(&format!(
            ": {}. {}",
            display(&error["code"]),
            display(&error["message"])
        ));
    }

    DataSourceStatus::error(message)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Objects decode as `T`; bare strings become `T` through `from_text`.
fn typed_rows<T, F>(rows: Vec<Value>, from_text: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(String) -> T,
{
    rows.into_iter()
        .map(|row| match row {
            Value::String(text) => Ok(from_text(text)),
            other => serde_json::from_value(other)
                .map_err(|err| ServiceError::InvalidResponse(err.to_string())),
        })
        .collect()
}
