//! Turns one editor [`Query`] into its canonical [`NormalizedQuery`].

use crate::{
    model::{defaults, NormalizedQuery, Query, QueryMode},
    pattern::normalize_value,
    variables::Scope,
};

/// Fills every absent field with its sentinel. Present values are kept as typed.
pub fn with_defaults(query: &Query) -> Query {
    let mut filled = query.clone();
    filled.mode.get_or_insert(defaults::MODE);
    filled.object_type.get_or_insert(defaults::OBJECT_TYPE);
    filled.downtime_as_ok.get_or_insert(defaults::DOWNTIME_AS_OK);
    filled.time_cut.get_or_insert_with(|| defaults::TIME_CUT.to_string());
    filled.result_format.get_or_insert(defaults::RESULT_FORMAT);
    filled.hard_state.get_or_insert(defaults::HARD_STATE);
    filled.extended_state.get_or_insert(defaults::EXTENDED_STATE);
    filled.host.get_or_insert_with(|| defaults::HOST.to_string());
    filled.service.get_or_insert_with(|| defaults::SERVICE.to_string());
    filled.hostgroup.get_or_insert_with(|| defaults::HOSTGROUP.to_string());
    filled.servicegroup.get_or_insert_with(|| defaults::SERVICEGROUP.to_string());
    filled.service_catalog.get_or_insert_with(|| defaults::SERVICE_CATALOG.to_string());
    filled.metric.get_or_insert_with(|| defaults::METRIC.to_string());
    filled.group_by.get_or_insert(defaults::GROUP_BY);
    filled
}

/// Produces the backend-ready form of `query`.
///
/// Clearing runs before substitution: System mode empties host and service, then each of
/// host, service and metric is emptied when it still holds its sentinel. Every filter
/// field is then resolved against `scope` and compressed by the pattern normalizer.
pub fn normalize_query(query: &Query, scope: &Scope) -> NormalizedQuery {
    let filled = with_defaults(query);
    let mode = filled.mode.unwrap_or(defaults::MODE);

    let mut host = filled.host.unwrap_or_default();
    let mut service = filled.service.unwrap_or_default();
    let mut metric = filled.metric.unwrap_or_default();

    if mode == QueryMode::System {
        host.clear();
        service.clear();
    }
    if host == defaults::HOST {
        host.clear();
    }
    if service == defaults::SERVICE {
        service.clear();
    }
    if metric == defaults::METRIC {
        metric.clear();
    }

    let canonical = |value: &str| normalize_value(&scope.resolve(value));

    NormalizedQuery {
        ref_id: filled.ref_id,
        disabled: filled.disabled,
        editor_mode: filled.editor_mode,
        alias: filled.alias,
        target: filled.target,
        mode,
        object_type: filled.object_type.unwrap_or(defaults::OBJECT_TYPE),
        host: canonical(&host),
        service: canonical(&service),
        hostgroup: canonical(&filled.hostgroup.unwrap_or_default()),
        servicegroup: canonical(&filled.servicegroup.unwrap_or_default()),
        service_catalog: canonical(&filled.service_catalog.unwrap_or_default()),
        metric: canonical(&metric),
        time_cut: filled.time_cut.unwrap_or_default(),
        result_format: filled.result_format.unwrap_or(defaults::RESULT_FORMAT),
        group_by: filled.group_by.unwrap_or(defaults::GROUP_BY),
        hard_state: filled.hard_state.unwrap_or(defaults::HARD_STATE),
        extended_state: filled.extended_state.unwrap_or(defaults::EXTENDED_STATE),
        downtime_as_ok: filled.downtime_as_ok.unwrap_or(defaults::DOWNTIME_AS_OK),
    }
}
