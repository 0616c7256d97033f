//! Type-aware item comparison for table sorting

use serde_json::Value;
use std::cmp::Ordering;

use crate::core::field::SortDirection;
use crate::core::value::{get_nested, js_string, timestamp_millis};

/// Compare two items on `key` in `direction`
///
/// Both sides are first reduced to a representative scalar (see
/// [`sort_value`]). Timestamps compare chronologically, numeric-like values
/// numerically, anything else with a case-insensitive natural collation.
pub fn compare(a: &Value, b: &Value, key: &str, direction: SortDirection) -> Ordering {
    let a = sort_value(a, key);
    let b = sort_value(b, key);

    let ordering = match (timestamp_millis(&a), timestamp_millis(&b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (numeric_value(&a), numeric_value(&b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => natural_cmp(&js_string(&a), &js_string(&b)),
        },
    };

    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Stable sort of item references
pub fn sort_items(items: &mut [&Value], key: &str, direction: SortDirection) {
    items.sort_by(|a, b| compare(a, b, key, direction));
}

/// The scalar an item is sorted by
///
/// Arrays reduce to their first non-null element, missing and null values
/// to the empty string. A `currencies` map reduces to its first key and a
/// `languages` map to its first value.
pub fn sort_value(item: &Value, key: &str) -> Value {
    let raw = match get_nested(item, key) {
        None | Some(Value::Null) => return Value::String(String::new()),
        Some(raw) => raw,
    };

    match (key, raw) {
        (_, Value::Array(values)) => values
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
        ("currencies", Value::Object(map)) => {
            Value::String(map.keys().next().cloned().unwrap_or_default())
        }
        ("languages", Value::Object(map)) => match map.values().next() {
            Some(Value::String(s)) => Value::String(s.clone()),
            _ => Value::String(String::new()),
        },
        (_, other) => other.clone(),
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Case-insensitive comparison where digit runs compare by numeric value
///
/// `"item2" < "item10"`. Accents are not folded.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_run = take_digits(&mut a_chars);
                let y_run = take_digits(&mut b_chars);
                let ordering = compare_digit_runs(&x_run, &y_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_natural_order() {
        assert_eq!(natural_cmp("item2", "item10"), Ordering::Less);
        assert_eq!(natural_cmp("Apple", "apple"), Ordering::Equal);
        assert_eq!(natural_cmp("b", "A"), Ordering::Greater);
        assert_eq!(natural_cmp("x007", "x7"), Ordering::Equal);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
    }

    #[test]
    fn test_numeric_strings_compare_numerically() {
        let a = json!({"population": "9"});
        let b = json!({"population": "10"});
        assert_eq!(compare(&a, &b, "population", SortDirection::Asc), Ordering::Less);
        assert_eq!(compare(&a, &b, "population", SortDirection::Desc), Ordering::Greater);
    }

    #[test]
    fn test_dates_compare_chronologically() {
        let a = json!({"created_at": "2024-02-01T00:00:00Z"});
        let b = json!({"created_at": "2024-01-15"});
        assert_eq!(compare(&a, &b, "created_at", SortDirection::Asc), Ordering::Greater);
    }

    #[test]
    fn test_sort_value_reductions() {
        let item = json!({
            "capital": [null, "Bern"],
            "currencies": {"CHF": {"name": "Swiss franc"}},
            "languages": {"fra": "French", "deu": "German"},
            "empty": []
        });
        assert_eq!(sort_value(&item, "capital"), json!("Bern"));
        assert_eq!(sort_value(&item, "currencies"), json!("CHF"));
        assert_eq!(sort_value(&item, "languages"), json!("French"));
        assert_eq!(sort_value(&item, "empty"), json!(""));
        assert_eq!(sort_value(&item, "missing"), json!(""));
    }

    #[test]
    fn test_nested_key() {
        let mut items = vec![
            json!({"name": {"common": "item10"}}),
            json!({"name": {"common": "Item2"}}),
            json!({"name": {"common": "item1"}}),
        ];
        items.sort_by(|a, b| compare(a, b, "name.common", SortDirection::Asc));
        let names: Vec<_> = items.iter().map(|i| i["name"]["common"].clone()).collect();
        assert_eq!(names, vec![json!("item1"), json!("Item2"), json!("item10")]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let a = json!({"k": "x", "n": 1});
        let b = json!({"k": "X", "n": 2});
        let mut items = vec![&a, &b];
        sort_items(&mut items, "k", SortDirection::Desc);
        assert_eq!(items[0]["n"], 1);
    }
}
