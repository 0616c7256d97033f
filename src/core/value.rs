//! Helpers over opaque JSON items
//!
//! Items are plain `serde_json::Value` records. The only structure the
//! engine relies on is dot-path property access and an identity field.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Row identity of an item
pub type ItemId = String;

/// Identity fields probed, in order, when no id field is configured
pub const IDENTITY_FIELDS: &[&str] = &["id", "_id", "cca3"];

/// Resolve a dot-path such as `name.common`
///
/// Numeric segments index into arrays. Returns `None` as soon as a segment
/// is missing.
pub fn get_nested<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(item, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(values) => segment.parse::<usize>().ok().and_then(|i| values.get(i)),
        _ => None,
    })
}

/// Render a value the way JavaScript's `String(value)` does
///
/// Integral floats lose their fractional part, arrays are comma-joined with
/// nulls rendered empty, objects render as `[object Object]`.
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(values) => values
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// JavaScript truthiness
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Every scalar reachable from `value`, lowercased
///
/// Object keys are not included, only values.
pub fn searchable_strings(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_scalars(value, &mut out);
    out
}

fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            out.push(js_string(value).to_lowercase())
        }
        Value::Array(values) => values.iter().for_each(|v| collect_scalars(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_scalars(v, out)),
    }
}

/// Interpret a value as an epoch timestamp in milliseconds
///
/// Finite numbers are taken as-is. Strings are accepted as RFC 3339 or as
/// `YYYY-MM-DD[THH:MM[:SS[.fff]]]`, the latter read as UTC.
pub fn timestamp_millis(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Parse an ISO-like date string into epoch milliseconds
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
    {
        return Some(dt.and_utc().timestamp_millis() as f64);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
}

/// Resolve the row identity of an item
///
/// Tries the configured field, then `id`, `_id` and `cca3`. Items without
/// any of them get a positional `row-<index>` identity.
pub fn item_id(item: &Value, id_field: Option<&str>, index: usize) -> ItemId {
    id_field
        .into_iter()
        .chain(IDENTITY_FIELDS.iter().copied())
        .find_map(|field| get_nested(item, field).and_then(identity_string))
        .unwrap_or_else(|| format!("row-{index}"))
}

/// Identity of an item without positional fallback
pub fn explicit_item_id(item: &Value, id_field: Option<&str>) -> Option<ItemId> {
    id_field
        .into_iter()
        .chain(IDENTITY_FIELDS.iter().copied())
        .find_map(|field| get_nested(item, field).and_then(identity_string))
}

fn identity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(_) => Some(js_string(value)),
        _ => None,
    }
}
