//! Template variables and the read-only scope used to resolve references to them.
//!
//! The host environment owns every variable. Callers hand the core a [`Scope`]
//! built from a snapshot, and resolution never writes back to it.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Matches `$name`, `[[name]]`, `[[name:format]]`, `${name}` and `${name:format}`.
static VARIABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(\w+)|\[\[(\w+?)(?::(\w+))?\]\]|\$\{(\w+)(?::([^}]+))?\}")
        .expect("variable reference regex is valid")
});

const ALL_VALUE: &str = "$__all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Custom,
    Query,
    Constant,
    Datasource,
    Interval,
    Textbox,
    Adhoc,
    System,
}

impl VariableKind {
    /// Ad-hoc filters travel as request metadata and system variables are owned by the host.
    pub fn is_substitutable(&self) -> bool {
        !matches!(self, VariableKind::Adhoc | VariableKind::System)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

/// Any JSON value is accepted: arrays become `Multi`, everything else `Single`.
impl<'de> Deserialize<'de> for VariableValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(VariableValue::from)
    }
}

impl From<Value> for VariableValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => {
                VariableValue::Multi(values.into_iter().map(scalar_text).collect())
            }
            other => VariableValue::Single(scalar_text(other)),
        }
    }
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl VariableValue {
    fn contains_all(&self) -> bool {
        match self {
            VariableValue::Single(value) => value == ALL_VALUE,
            VariableValue::Multi(values) => values.iter().any(|value| value == ALL_VALUE),
        }
    }

    fn values(&self) -> Vec<&str> {
        match self {
            VariableValue::Single(value) => vec![value.as_str()],
            VariableValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl Default for VariableValue {
    fn default() -> Self {
        VariableValue::Single(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableCurrent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<VariableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<VariableValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableOption {
    pub text: String,
    pub value: String,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VariableWire")]
pub struct Variable {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: VariableKind,
    #[serde(default)]
    pub current: VariableCurrent,
    #[serde(default)]
    pub multi: bool,
    #[serde(rename = "includeAll", default)]
    pub include_all: bool,
    #[serde(rename = "allValue", default, skip_serializing_if = "Option::is_none")]
    pub all_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<VariableOption>,
}

/// Hosts send `id`, `name` or both, and `type` or `kind`.
#[derive(Deserialize)]
struct VariableWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<VariableKind>,
    #[serde(rename = "kind", default)]
    kind_alt: Option<VariableKind>,
    #[serde(default)]
    current: VariableCurrent,
    #[serde(default)]
    multi: bool,
    #[serde(rename = "includeAll", default)]
    include_all: bool,
    #[serde(rename = "allValue", default)]
    all_value: Option<String>,
    #[serde(default)]
    options: Vec<VariableOption>,
}

impl TryFrom<VariableWire> for Variable {
    type Error = String;

    fn try_from(wire: VariableWire) -> Result<Self, Self::Error> {
        let id = wire
            .id
            .filter(|id| !id.is_empty())
            .or(wire.name)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "variable has neither id nor name".to_string())?;
        let kind = wire
            .kind
            .or(wire.kind_alt)
            .ok_or_else(|| format!("variable {id} has no type"))?;

        Ok(Self {
            id,
            kind,
            current: wire.current,
            multi: wire.multi,
            include_all: wire.include_all,
            all_value: wire.all_value,
            options: wire.options,
        })
    }
}

impl Variable {
    pub fn single(id: impl Into<String>, kind: VariableKind, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            id: id.into(),
            kind,
            current: VariableCurrent {
                text: Some(VariableValue::Single(value.clone())),
                value: Some(VariableValue::Single(value)),
            },
            multi: false,
            include_all: false,
            all_value: None,
            options: Vec::new(),
        }
    }

    pub fn multi<I, S>(id: impl Into<String>, kind: VariableKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        Self {
            id: id.into(),
            kind,
            current: VariableCurrent {
                text: Some(VariableValue::Single(values.join(" + "))),
                value: Some(VariableValue::Multi(values)),
            },
            multi: true,
            include_all: false,
            all_value: None,
            options: Vec::new(),
        }
    }

    /// The value this variable contributes to substitution, if any.
    pub fn resolved_value(&self) -> Option<VariableValue> {
        if !self.kind.is_substitutable() {
            return None;
        }
        let current = self.current.value.clone()?;

        match self.kind {
            VariableKind::Custom | VariableKind::Query => Some(self.multi_value(current)),
            _ => Some(current),
        }
    }

    fn multi_value(&self, current: VariableValue) -> VariableValue {
        if current.contains_all() {
            if let Some(all) = &self.all_value {
                return VariableValue::Single(all.clone());
            }
            let every: Vec<String> = self
                .options
                .iter()
                .filter(|option| option.value != ALL_VALUE)
                .map(|option| option.value.clone())
                .collect();
            return VariableValue::Multi(every);
        }

        match current {
            VariableValue::Multi(mut values) if !self.multi && values.len() == 1 => {
                VariableValue::Single(values.remove(0))
            }
            other => other,
        }
    }

    /// Placeholder users can pick in a selector to mean "use this variable".
    pub fn placeholder(&self) -> String {
        format!("${}", self.id)
    }
}

/// Request-level resolved value, keyed by variable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<VariableValue>,
    #[serde(default)]
    pub value: VariableValue,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocFilter {
    pub key: String,
    pub operator: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// How a resolved value is rendered into the surrounding text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationFormat {
    /// `{a,b}` for sets, compressed later by the pattern normalizer.
    #[default]
    Glob,
    /// Regex-escaped values, sets rendered as `(a|b)`.
    Regex,
    Json,
    Csv,
    Pipe,
}

impl InterpolationFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "glob" | "raw" => Some(InterpolationFormat::Glob),
            "regex" => Some(InterpolationFormat::Regex),
            "json" => Some(InterpolationFormat::Json),
            "csv" => Some(InterpolationFormat::Csv),
            "pipe" => Some(InterpolationFormat::Pipe),
            _ => None,
        }
    }

    fn render(&self, value: &VariableValue) -> String {
        match self {
            InterpolationFormat::Glob => match value {
                VariableValue::Multi(values) if values.len() > 1 => {
                    format!("{{{}}}", values.join(","))
                }
                other => other.values().join(","),
            },
            InterpolationFormat::Regex => {
                let escaped: Vec<String> = value.values().into_iter().map(regex::escape).collect();
                if escaped.len() > 1 {
                    format!("({})", escaped.join("|"))
                } else {
                    escaped.join("")
                }
            }
            InterpolationFormat::Json => serde_json::to_string(value).unwrap_or_default(),
            InterpolationFormat::Csv => value.values().join(","),
            InterpolationFormat::Pipe => value.values().join("|"),
        }
    }
}

/// Read access to the host environment's variables.
pub trait VariableSource {
    /// Variables in declaration order.
    fn current_variables(&self) -> Vec<Variable>;

    fn current_adhoc_filters(&self, source_id: &str) -> Vec<AdhocFilter>;
}

/// A serializable point-in-time copy of the host's variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableSnapshot {
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(rename = "adhocFilters", default)]
    pub adhoc_filters: Vec<AdhocFilter>,
}

impl VariableSource for VariableSnapshot {
    fn current_variables(&self) -> Vec<Variable> {
        self.variables.clone()
    }

    fn current_adhoc_filters(&self, _source_id: &str) -> Vec<AdhocFilter> {
        self.adhoc_filters.clone()
    }
}

/// The read-only context every normalization call receives.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: Vec<Variable>,
    adhoc_filters: Vec<AdhocFilter>,
    scoped: BTreeMap<String, ScopedValue>,
}

impl Scope {
    pub fn new(variables: Vec<Variable>, adhoc_filters: Vec<AdhocFilter>) -> Self {
        Self {
            variables,
            adhoc_filters,
            scoped: BTreeMap::new(),
        }
    }

    pub fn from_source(source: &dyn VariableSource, source_id: &str) -> Self {
        Self::new(
            source.current_variables(),
            source.current_adhoc_filters(source_id),
        )
    }

    /// Overlays request-level values, which take precedence over the global ones.
    pub fn with_scoped_vars(mut self, scoped: BTreeMap<String, ScopedValue>) -> Self {
        self.scoped.extend(scoped);
        self
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn adhoc_filters(&self) -> &[AdhocFilter] {
        &self.adhoc_filters
    }

    /// Current values of every substitutable variable, keyed by id.
    pub fn global_values(&self) -> BTreeMap<String, ScopedValue> {
        self.variables
            .iter()
            .filter_map(|variable| {
                let value = variable.resolved_value()?;
                Some((
                    variable.id.clone(),
                    ScopedValue {
                        text: variable.current.text.clone(),
                        value,
                        selected: false,
                    },
                ))
            })
            .collect()
    }

    pub fn merged_values(&self) -> BTreeMap<String, ScopedValue> {
        let mut merged = self.global_values();
        for (name, value) in &self.scoped {
            if self.is_excluded(name) {
                continue;
            }
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    pub fn lookup(&self, name: &str) -> Option<VariableValue> {
        if self.is_excluded(name) {
            return None;
        }
        if let Some(scoped) = self.scoped.get(name) {
            return Some(scoped.value.clone());
        }
        self.variables
            .iter()
            .find(|variable| variable.id == name)
            .and_then(Variable::resolved_value)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.variables
            .iter()
            .any(|variable| variable.id == name && !variable.kind.is_substitutable())
    }

    /// Substitutes references for query fields, rendering sets in glob form.
    pub fn resolve(&self, input: &str) -> String {
        self.interpolate(input, InterpolationFormat::Glob)
    }

    /// Substitutes every reference it can resolve; unknown names keep their text as written.
    ///
    /// Values that themselves hold references are expanded before rendering, so the output
    /// resolves to itself. A reference that would recurse into a variable already being
    /// expanded is left as written.
    pub fn interpolate(&self, input: &str, format: InterpolationFormat) -> String {
        self.interpolate_within(input, format, &mut Vec::new())
    }

    fn interpolate_within(
        &self,
        input: &str,
        format: InterpolationFormat,
        expanding: &mut Vec<String>,
    ) -> String {
        if !input.contains('$') && !input.contains("[[") {
            return input.to_string();
        }

        VARIABLE_REFERENCE
            .replace_all(input, |caps: &Captures<'_>| {
                let written = caps[0].to_string();
                let (name, explicit) = if let Some(name) = caps.get(1) {
                    (name.as_str(), None)
                } else if let Some(name) = caps.get(2) {
                    (name.as_str(), caps.get(3).map(|m| m.as_str()))
                } else if let Some(name) = caps.get(4) {
                    (name.as_str(), caps.get(5).map(|m| m.as_str()))
                } else {
                    return written;
                };

                if expanding.iter().any(|active| active == name) {
                    return written;
                }
                let Some(value) = self.lookup(name) else {
                    return written;
                };

                let format = explicit
                    .and_then(InterpolationFormat::parse)
                    .unwrap_or(format);
                expanding.push(name.to_string());
                let value = self.expand(value, expanding);
                expanding.pop();
                format.render(&value)
            })
            .into_owned()
    }

    fn expand(&self, value: VariableValue, expanding: &mut Vec<String>) -> VariableValue {
        let mut raw = |text: String| {
            self.interpolate_within(&text, InterpolationFormat::Glob, expanding)
        };
        match value {
            VariableValue::Single(text) => VariableValue::Single(raw(text)),
            VariableValue::Multi(values) => {
                VariableValue::Multi(values.into_iter().map(&mut raw).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new(
            vec![
                Variable::single("host", VariableKind::Textbox, "web01"),
                Variable::multi("hosts", VariableKind::Custom, ["web01", "web02"]),
                Variable::single("filters", VariableKind::Adhoc, "ignored"),
                Variable::single("system", VariableKind::System, "ignored"),
            ],
            vec![AdhocFilter {
                key: "site".into(),
                operator: "=".into(),
                value: "north".into(),
                condition: None,
            }],
        )
    }

    #[test]
    fn resolves_single_values_in_every_syntax() {
        let scope = scope();
        assert_eq!(scope.resolve("$host"), "web01");
        assert_eq!(scope.resolve("${host}"), "web01");
        assert_eq!(scope.resolve("[[host]]"), "web01");
        assert_eq!(scope.resolve("/^$host$/"), "/^web01$/");
    }

    #[test]
    fn multi_values_render_as_sets() {
        let scope = scope();
        assert_eq!(scope.resolve("$hosts"), "{web01,web02}");
        assert_eq!(
            scope.interpolate("$hosts", InterpolationFormat::Regex),
            "(web01|web02)"
        );
        assert_eq!(
            scope.interpolate("$hosts", InterpolationFormat::Json),
            r#"["web01","web02"]"#
        );
        assert_eq!(scope.resolve("${hosts:pipe}"), "web01|web02");
    }

    #[test]
    fn unknown_and_excluded_references_pass_through() {
        let scope = scope();
        assert_eq!(scope.resolve("$missing"), "$missing");
        assert_eq!(scope.resolve("$filters"), "$filters");
        assert_eq!(scope.resolve("${system}"), "${system}");
    }

    #[test]
    fn resolution_is_idempotent() {
        let scope = scope();
        let once = scope.resolve("$host-$hosts");
        assert_eq!(scope.resolve(&once), once);
    }

    #[test]
    fn values_holding_references_resolve_to_a_fixed_point() {
        let scope = Scope::new(
            vec![
                Variable::single("a", VariableKind::Textbox, "$b"),
                Variable::single("b", VariableKind::Textbox, "x"),
                Variable::single("loop", VariableKind::Textbox, "[[loop]]-1"),
            ],
            Vec::new(),
        );

        assert_eq!(scope.resolve("$a"), "x");
        assert_eq!(scope.resolve(&scope.resolve("$a")), "x");
        assert_eq!(scope.resolve("$loop"), "[[loop]]-1");
        assert_eq!(scope.resolve(&scope.resolve("$loop")), "[[loop]]-1");
    }

    #[test]
    fn snapshots_accept_id_and_name_together() {
        let snapshot: VariableSnapshot = serde_json::from_value(serde_json::json!({
            "variables": [
                { "id": "site", "name": "site", "type": "textbox", "current": { "value": "north" } },
                { "id": "", "name": "env", "kind": "constant", "current": { "value": "prod" } }
            ]
        }))
        .unwrap();

        assert_eq!(snapshot.variables[0].id, "site");
        assert_eq!(snapshot.variables[1].id, "env");
        assert_eq!(snapshot.variables[1].kind, VariableKind::Constant);

        let unnamed = serde_json::from_value::<Variable>(serde_json::json!({ "type": "textbox" }));
        assert!(unnamed.is_err());
    }

    #[test]
    fn scoped_values_accept_any_json_scalar() {
        let scoped: BTreeMap<String, ScopedValue> = serde_json::from_value(serde_json::json!({
            "__interval_ms": { "text": "1000", "value": 1000 },
            "flag": { "value": true },
            "set": { "value": ["a", 2] }
        }))
        .unwrap();

        assert_eq!(
            scoped["__interval_ms"].value,
            VariableValue::Single("1000".into())
        );
        assert_eq!(scoped["flag"].value, VariableValue::Single("true".into()));
        assert_eq!(
            scoped["set"].value,
            VariableValue::Multi(vec!["a".into(), "2".into()])
        );

        let scope = Scope::default().with_scoped_vars(scoped);
        assert_eq!(scope.resolve("${__interval_ms}"), "1000");
    }

    #[test]
    fn scoped_values_override_globals() {
        let mut scoped = BTreeMap::new();
        scoped.insert(
            "host".to_string(),
            ScopedValue {
                text: None,
                value: VariableValue::Single("db01".into()),
                selected: false,
            },
        );
        let scope = scope().with_scoped_vars(scoped);

        assert_eq!(scope.resolve("$host"), "db01");
        assert_eq!(
            scope.merged_values()["host"].value,
            VariableValue::Single("db01".into())
        );
    }

    #[test]
    fn global_values_skip_adhoc_and_system() {
        let values = scope().global_values();
        assert_eq!(
            values.keys().cloned().collect::<Vec<_>>(),
            vec!["host".to_string(), "hosts".to_string()]
        );
    }

    #[test]
    fn all_selection_expands_to_options_or_custom_all_value() {
        let mut variable = Variable::multi("svc", VariableKind::Query, ["$__all"]);
        variable.include_all = true;
        variable.options = vec![
            VariableOption {
                text: "All".into(),
                value: "$__all".into(),
                selected: true,
            },
            VariableOption {
                text: "http".into(),
                value: "http".into(),
                selected: false,
            },
            VariableOption {
                text: "ssh".into(),
                value: "ssh".into(),
                selected: false,
            },
        ];
        assert_eq!(
            variable.resolved_value(),
            Some(VariableValue::Multi(vec!["http".into(), "ssh".into()]))
        );

        variable.all_value = Some(".*".into());
        assert_eq!(
            variable.resolved_value(),
            Some(VariableValue::Single(".*".into()))
        );
    }

    #[test]
    fn regex_format_escapes_single_values() {
        let scope = Scope::new(
            vec![Variable::single("v", VariableKind::Constant, "a.b")],
            Vec::new(),
        );
        assert_eq!(scope.interpolate("$v", InterpolationFormat::Regex), r"a\.b");
    }
}
