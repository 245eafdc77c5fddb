//! Filters and normalizes a batch of targets into the request sent to `<base>/query`.

use crate::{
    model::{defaults, NormalizedQuery, Query, QueryMode, QueryRequest, TimeRange},
    normalize::normalize_query,
    variables::{AdhocFilter, InterpolationFormat, Scope, ScopedValue},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Outbound request. Built fresh from a [`QueryRequest`] on every execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub targets: Vec<NormalizedQuery>,
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
    #[serde(rename = "adhocFilters", default)]
    pub adhoc_filters: Vec<AdhocFilter>,
}

impl BackendRequest {
    /// An empty request short-circuits execution without contacting the backend.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Capacity queries need an explicit service.
fn passes_mode_rule(query: &Query) -> bool {
    match query.mode_or_default() {
        QueryMode::Capacity => {
            query.service.as_deref().unwrap_or(defaults::SERVICE) != defaults::SERVICE
        }
        _ => true,
    }
}

/// Builds the outbound request for `request`, leaving the input untouched.
///
/// Targets keep their input order. Disabled targets, Capacity targets without a service
/// and targets missing a filter field are dropped. All survivors share one scope, with
/// the request's `scopedVars` overriding the global variable values.
pub fn build_request(request: &QueryRequest, scope: &Scope) -> BackendRequest {
    let scope = scope.clone().with_scoped_vars(request.scoped_vars.clone());

    let targets: Vec<NormalizedQuery> = request
        .targets
        .iter()
        .filter(|query| !query.disabled)
        .filter(|query| passes_mode_rule(query))
        .filter_map(|query| {
            let mut normalized = normalize_query(query, &scope);
            let missing = query.missing_fields();
            if !missing.is_empty() {
                debug!(
                    ref_id = ?query.ref_id,
                    missing = ?missing,
                    "dropping target with incomplete selection"
                );
                return None;
            }
            normalized.target = query
                .target
                .as_deref()
                .map(|target| scope.interpolate(target, InterpolationFormat::Regex));
            Some(normalized)
        })
        .collect();

    debug!(
        submitted = request.targets.len(),
        kept = targets.len(),
        "normalized query batch"
    );

    BackendRequest {
        targets,
        range: request.range.clone(),
        range_raw: request.range_raw.clone(),
        interval: request.interval.clone(),
        interval_ms: request.interval_ms,
        max_data_points: request.max_data_points,
        scoped_vars: scope.merged_values(),
        adhoc_filters: scope.adhoc_filters().to_vec(),
    }
}
