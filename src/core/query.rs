//! Query string parameters and the filter state encoding
//!
//! Filter state is written to the query string with one parameter per field:
//!
//! ```text
//! search=hello                      search / select: raw value
//! region=Europe,Asia                multiSelect: comma-joined
//! independent=true                  boolean: literal "true"
//! created_at_start=2024-01-01       dateRange: two suffixed parameters
//! created_at_end=2024-01-31
//! sortBy=name.common&sortOrder=desc reserved sort parameters
//! page=2&pageSize=30                reserved pagination parameters
//! ```
//!
//! Parameters at their default value are omitted.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;

use crate::core::field::{
    FilterFieldSpec, FilterKind, FilterValue, SORT_BY_KEY, SORT_ORDER_KEY, SortDirection,
};
use crate::core::filters::{FilterEngine, FilterState};

/// Reserved page number parameter
pub const PAGE_PARAM: &str = "page";

/// Reserved page size parameter
pub const PAGE_SIZE_PARAM: &str = "pageSize";

/// Ordered, possibly repeated, query string parameters
///
/// Mirrors the browser's `URLSearchParams`: [`get`](Self::get) returns the
/// first value, [`set`](Self::set) replaces every occurrence in place or
/// appends, and [`Display`](fmt::Display) renders the form-urlencoded string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string, with or without its leading `?`
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Set `key` to `value`, keeping the position of its first occurrence
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                self.pairs[index].1 = value;
                let mut seen = false;
                self.pairs.retain(|(k, _)| {
                    if *k != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.pairs.push((key, value)),
        }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Remove every occurrence of `key`
    pub fn delete(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        f.write_str(&encoded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Options of a filter state write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Keep the current `page` parameter instead of resetting it to 1
    pub preserve_page: bool,
}

impl WriteOptions {
    pub fn preserve_page() -> Self {
        Self {
            preserve_page: true,
        }
    }
}

fn range_param_keys(key: &str) -> (String, String) {
    (format!("{key}_start"), format!("{key}_end"))
}

/// Parse one field's raw query value
fn parse_field_value(field: &FilterFieldSpec, raw: &str) -> FilterValue {
    match &field.kind {
        FilterKind::Boolean { .. } => FilterValue::Flag(raw == "true"),
        FilterKind::MultiSelect { .. } => {
            if raw.is_empty() {
                FilterValue::List(Vec::new())
            } else {
                FilterValue::list(raw.split(','))
            }
        }
        FilterKind::Search { .. } | FilterKind::Select { .. } => FilterValue::text(raw),
        // range fields are read from their suffixed parameters
        FilterKind::DateRange => FilterValue::range(None, None),
    }
}

/// Derive the filter state encoded in a query string
///
/// Values equal to their field's default are skipped. `sortOrder` only
/// accepts `asc` / `desc`; an unknown order falls back to the default
/// direction.
pub fn read_filters(params: &QueryParams, engine: &FilterEngine) -> FilterState {
    let mut state = FilterState::default();

    for field in engine.fields().iter().filter(|f| !f.is_reserved()) {
        let value = match field.kind {
            FilterKind::DateRange => {
                let (start_key, end_key) = range_param_keys(&field.key);
                let start = params.get(&start_key).filter(|s| !s.is_empty());
                let end = params.get(&end_key).filter(|s| !s.is_empty());
                if start.is_none() && end.is_none() {
                    continue;
                }
                FilterValue::range(start, end)
            }
            _ => match params.get(&field.key) {
                Some(raw) => parse_field_value(field, raw),
                None => continue,
            },
        };

        if !field.is_default(&value) {
            state.values.insert(field.key.clone(), value);
        }
    }

    state.sort_by = params
        .get(SORT_BY_KEY)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    state.sort_order = params.get(SORT_ORDER_KEY).and_then(SortDirection::parse);

    engine.normalize(state)
}

/// Derive the query string that encodes `state`, starting from `current`
///
/// Every filter-owned parameter of `current` is removed first, so
/// parameters of fields back at their default disappear. Unrelated
/// parameters are kept in place. The `page` parameter is reset to 1 unless
/// `options.preserve_page` is set.
pub fn write_filters(
    current: &QueryParams,
    state: &FilterState,
    engine: &FilterEngine,
    options: WriteOptions,
) -> QueryParams {
    let mut params = current.clone();

    for field in engine.fields() {
        params.delete(&field.key);
        if matches!(field.kind, FilterKind::DateRange) {
            let (start_key, end_key) = range_param_keys(&field.key);
            params.delete(&start_key);
            params.delete(&end_key);
        }
    }
    params.delete(SORT_BY_KEY);
    params.delete(SORT_ORDER_KEY);

    for field in engine.fields().iter().filter(|f| !f.is_reserved()) {
        let Some(value) = state.values.get(&field.key) else {
            continue;
        };
        if field.is_default(value) {
            continue;
        }

        match value {
            FilterValue::Range(range) => {
                let (start_key, end_key) = range_param_keys(&field.key);
                if let Some(start) = range.start().filter(|s| !s.trim().is_empty()) {
                    params.set(start_key, start);
                }
                if let Some(end) = range.end().filter(|s| !s.trim().is_empty()) {
                    params.set(end_key, end);
                }
            }
            FilterValue::List(values) => params.set(field.key.clone(), values.join(",")),
            FilterValue::Flag(flag) => params.set(field.key.clone(), flag.to_string()),
            FilterValue::Text(text) => params.set(field.key.clone(), text.clone()),
        }
    }

    if state.sort_by.is_some() || state.sort_order.is_some() {
        let (sort_by, sort_order) = engine.effective_sort(state);
        if let Some(sort_by) = sort_by {
            params.set(SORT_BY_KEY, sort_by);
        }
        params.set(SORT_ORDER_KEY, sort_order.as_str());
    }

    let page = if options.preserve_page {
        current.get(PAGE_PARAM).unwrap_or("1").to_string()
    } else {
        "1".to_string()
    };
    params.set(PAGE_PARAM, page);

    params
}
