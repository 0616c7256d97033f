//! Per-field filter predicates
//!
//! [`matches`] decides whether a single item passes a single filter field.
//! Malformed input never panics: an unparseable date or a value of the wrong
//! shape simply does not match.

use serde_json::Value;

use crate::core::field::{DEFAULT_SEARCH_TARGETS, DateRange, FilterFieldSpec, FilterKind, FilterValue};
use crate::core::value::{get_nested, js_string, parse_timestamp, searchable_strings, timestamp_millis, truthy};

/// Whether `item` passes `field` at `value`
///
/// Empty text and empty lists always pass.
pub fn matches(item: &Value, field: &FilterFieldSpec, value: &FilterValue) -> bool {
    match value {
        FilterValue::Text(s) if s.is_empty() => return true,
        FilterValue::List(l) if l.is_empty() => return true,
        _ => {}
    }

    match (&field.kind, value) {
        (FilterKind::Search { targets }, FilterValue::Text(term)) => {
            let term = term.trim().to_lowercase();
            if term.is_empty() {
                return true;
            }
            match targets {
                Some(targets) => matches_search(item, &term, targets.iter().map(String::as_str)),
                None => matches_search(item, &term, DEFAULT_SEARCH_TARGETS.iter().copied()),
            }
        }
        (
            FilterKind::Select {
                match_map_keys, ..
            },
            FilterValue::Text(selected),
        ) => {
            let selected = selected.trim().to_lowercase();
            let Some(item_value) = get_nested(item, field.path()) else {
                return false;
            };
            if *match_map_keys {
                return item_value
                    .as_object()
                    .is_some_and(|map| map.keys().any(|k| k.to_lowercase() == selected));
            }
            !item_value.is_null() && js_string(item_value).to_lowercase() == selected
        }
        (FilterKind::MultiSelect { .. }, FilterValue::List(allowed)) => {
            let item_value = get_nested(item, field.path())
                .map(js_string)
                .unwrap_or_else(|| "undefined".to_string());
            allowed.contains(&item_value)
        }
        (FilterKind::Boolean { strict }, FilterValue::Flag(flag)) => {
            let item_value = get_nested(item, field.path());
            if *strict {
                item_value == Some(&Value::Bool(*flag))
            } else {
                item_value.is_some_and(truthy) == *flag
            }
        }
        (FilterKind::DateRange, FilterValue::Range(range)) => {
            matches_date_range(get_nested(item, field.path()), range)
        }
        _ => false,
    }
}

fn matches_search<'a>(item: &Value, term: &str, targets: impl Iterator<Item = &'a str>) -> bool {
    let direct = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| s.to_lowercase().contains(term))
    };
    if direct("national") || direct("foreign") {
        return true;
    }

    let mut targets = targets;
    if targets.any(|path| get_nested(item, path).is_some_and(|v| value_contains(v, term))) {
        return true;
    }

    searchable_strings(item).iter().any(|s| s.contains(term))
}

fn value_contains(value: &Value, term: &str) -> bool {
    match value {
        Value::Null => false,
        Value::Array(values) => values.iter().any(|v| value_contains(v, term)),
        other => js_string(other).to_lowercase().contains(term),
    }
}

/// Inclusive containment; items without a date pass
fn matches_date_range(item_value: Option<&Value>, range: &DateRange) -> bool {
    let Some(item_value) = item_value.filter(|v| truthy(v)) else {
        return true;
    };
    if range.is_empty() {
        return true;
    }

    let Some(ts) = timestamp_millis(item_value).or_else(|| parse_timestamp(&js_string(item_value)))
    else {
        return false;
    };

    let after_start = range
        .start()
        .and_then(parse_timestamp)
        .is_none_or(|start| ts >= start);
    let before_end = range
        .end()
        .and_then(parse_timestamp)
        .is_none_or(|end| ts <= end);
    after_start && before_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::FilterFieldSpec;
    use serde_json::json;

    fn search_field() -> FilterFieldSpec {
        FilterFieldSpec::new("search", "Search", FilterKind::Search { targets: None })
    }

    fn select_field(key: &str) -> FilterFieldSpec {
        FilterFieldSpec::new(
            key,
            key,
            FilterKind::Select {
                options: vec![],
                options_from: None,
                match_map_keys: false,
            },
        )
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let field = search_field();
        let hello = json!({"national": "Hello", "foreign": "Bonjour"});
        let world = json!({"national": "World", "foreign": "Monde"});
        assert!(matches(&hello, &field, &FilterValue::text("hello")));
        assert!(!matches(&world, &field, &FilterValue::text("hello")));
        assert!(matches(&world, &field, &FilterValue::text("  MON ")));
    }

    #[test]
    fn test_search_targets_and_fallback() {
        let field = search_field();
        let country = json!({
            "name": {"common": "Japan", "official": "Japan"},
            "capital": ["Tokyo"],
            "tld": [".jp"],
            "population": 125000000
        });
        assert!(matches(&country, &field, &FilterValue::text("tok")));
        assert!(matches(&country, &field, &FilterValue::text(".jp")));
        assert!(matches(&country, &field, &FilterValue::text("125000")));
        assert!(!matches(&country, &field, &FilterValue::text("paris")));
    }

    #[test]
    fn test_blank_search_passes() {
        assert!(matches(&json!({}), &search_field(), &FilterValue::text("   ")));
    }

    #[test]
    fn test_select_exact_match() {
        let field = select_field("region");
        let item = json!({"region": "Europe"});
        assert!(matches(&item, &field, &FilterValue::text("europe")));
        assert!(!matches(&item, &field, &FilterValue::text("eur")));
        assert!(!matches(&json!({}), &field, &FilterValue::text("europe")));
        assert!(!matches(&json!({"region": null}), &field, &FilterValue::text("null")));
    }

    #[test]
    fn test_select_map_keys() {
        let field = FilterFieldSpec::new(
            "currency",
            "Currency",
            FilterKind::Select {
                options: vec![],
                options_from: None,
                match_map_keys: true,
            },
        )
        .with_path("currencies");
        let item = json!({"currencies": {"EUR": {"name": "Euro"}, "CHF": {}}});
        assert!(matches(&item, &field, &FilterValue::text("chf")));
        assert!(!matches(&item, &field, &FilterValue::text("usd")));
        assert!(!matches(&json!({"currencies": "EUR"}), &field, &FilterValue::text("eur")));
    }

    #[test]
    fn test_multi_select_membership() {
        let field = FilterFieldSpec::new(
            "region",
            "Region",
            FilterKind::MultiSelect {
                options: vec![],
                options_from: None,
            },
        );
        let allowed = FilterValue::list(["Europe", "Asia"]);
        assert!(matches(&json!({"region": "Asia"}), &field, &allowed));
        assert!(!matches(&json!({"region": "Africa"}), &field, &allowed));
        assert!(matches(&json!({"region": "Africa"}), &field, &FilterValue::list(Vec::<String>::new())));
    }

    #[test]
    fn test_boolean_loose_and_strict() {
        let loose = FilterFieldSpec::new("unMember", "UN", FilterKind::Boolean { strict: false });
        let strict = FilterFieldSpec::new("independent", "Independent", FilterKind::Boolean { strict: true });
        assert!(matches(&json!({"unMember": 1}), &loose, &FilterValue::Flag(true)));
        assert!(matches(&json!({}), &loose, &FilterValue::Flag(false)));
        assert!(matches(&json!({"independent": true}), &strict, &FilterValue::Flag(true)));
        assert!(!matches(&json!({"independent": 1}), &strict, &FilterValue::Flag(true)));
        assert!(!matches(&json!({}), &strict, &FilterValue::Flag(false)));
    }

    #[test]
    fn test_date_range_inclusive() {
        let field = FilterFieldSpec::new("created_at", "Created", FilterKind::DateRange);
        let january = FilterValue::range(Some("2024-01-01"), Some("2024-01-31"));
        assert!(matches(&json!({"created_at": "2024-01-15"}), &field, &january));
        assert!(!matches(&json!({"created_at": "2024-02-01"}), &field, &january));
        assert!(matches(&json!({"created_at": "2024-01-01"}), &field, &january));
        assert!(matches(&json!({"created_at": "2024-01-31"}), &field, &january));
    }

    #[test]
    fn test_date_range_missing_and_malformed() {
        let field = FilterFieldSpec::new("created_at", "Created", FilterKind::DateRange);
        let from = FilterValue::range(Some("2024-01-01"), None);
        assert!(matches(&json!({}), &field, &from));
        assert!(matches(&json!({"created_at": ""}), &field, &from));
        assert!(!matches(&json!({"created_at": "yesterday"}), &field, &from));
        let bad_bound = FilterValue::range(Some("garbage"), None);
        assert!(matches(&json!({"created_at": "2024-01-15"}), &field, &bad_bound));
    }

    #[test]
    fn test_wrong_shape_does_not_match() {
        let field = FilterFieldSpec::new("created_at", "Created", FilterKind::DateRange);
        assert!(!matches(&json!({"created_at": "2024-01-15"}), &field, &FilterValue::Flag(true)));
    }
}
