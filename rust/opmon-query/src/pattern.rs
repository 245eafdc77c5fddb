//! Set-pattern compression: `{a,b,c}` becomes the alternation `/^(a|b|c)$/`.

use once_cell::sync::Lazy;
use regex::Regex;

static SET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/?\^?\{(.*)\}\$?/?$").expect("set pattern regex is valid"));

/// Rewrites a brace-delimited set into the backend's alternation pattern.
///
/// Absent input stays absent and anything that is not a set passes through untouched,
/// so the function is safe to apply to every filter field unconditionally.
pub fn normalize_pattern(value: Option<&str>) -> Option<String> {
    value.map(normalize_value)
}

pub fn normalize_value(value: &str) -> String {
    let Some(captures) = SET_PATTERN.captures(value) else {
        return value.to_string();
    };
    let inner = captures.get(1).map_or("", |m| m.as_str());

    let alternatives: Vec<String> = inner.split(',').map(escape_slashes).collect();
    format!("/^({})$/", alternatives.join("|"))
}

fn escape_slashes(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut previous = None;
    for ch in value.chars() {
        if ch == '/' && previous != Some('\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
        previous = Some(ch);
    }
    escaped
}
