//! Filter field descriptors and filter values
//!
//! A resource declares its filter dimensions as a list of [`FilterFieldSpec`].
//! The field type is a closed sum type ([`FilterKind`]) so that predicate
//! evaluation, default values and URL encoding are all exhaustive matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::value::{get_nested, js_string};

/// Reserved state key holding the sort column
pub const SORT_BY_KEY: &str = "sortBy";

/// Reserved state key holding the sort direction
pub const SORT_ORDER_KEY: &str = "sortOrder";

/// Item properties inspected by a search field before the full-text fallback
pub const DEFAULT_SEARCH_TARGETS: &[&str] = &[
    "name.common",
    "name.official",
    "capital",
    "region",
    "subregion",
    "cca2",
    "cca3",
    "national",
    "foreign",
];

/// Whether a key is one of the two reserved sort keys
pub fn is_reserved_key(key: &str) -> bool {
    key == SORT_BY_KEY || key == SORT_ORDER_KEY
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Parse `asc` / `desc`, anything else is rejected
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sort column with its direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: key.into(),
            direction,
        }
    }
}

/// A selectable option of a select or multiSelect field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}

impl FilterOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Derives the options of a field from the loaded items
///
/// Both generators prepend an "all" option whose value is the empty string,
/// which is the neutral value of a select field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OptionsGenerator {
    /// Unique scalar values found at `path`, sorted
    Distinct {
        path: String,
        #[serde(default)]
        all_label: Option<String>,
    },

    /// Unique keys of the keyed map found at `path`, sorted
    ///
    /// With `label_field`, an option reads `CODE - <entry.label_field>` and
    /// entries without that label are skipped.
    MapKeys {
        path: String,
        #[serde(default)]
        label_field: Option<String>,
        #[serde(default)]
        all_label: Option<String>,
    },
}

impl OptionsGenerator {
    /// Generate options from a collection of items
    pub fn generate(&self, items: &[Value]) -> Vec<FilterOption> {
        match self {
            OptionsGenerator::Distinct { path, all_label } => {
                let mut values: Vec<String> = items
                    .iter()
                    .filter_map(|item| get_nested(item, path))
                    .filter(|v| !v.is_null() && !v.is_object() && !v.is_array())
                    .map(js_string)
                    .filter(|s| !s.is_empty())
                    .collect();
                values.sort();
                values.dedup();

                let mut options = vec![FilterOption::new("", all_label_or(all_label))];
                options.extend(values.into_iter().map(|v| FilterOption::new(v.clone(), v)));
                options
            }
            OptionsGenerator::MapKeys {
                path,
                label_field,
                all_label,
            } => {
                // first label seen for a code wins
                let mut entries: BTreeMap<String, String> = BTreeMap::new();
                for map in items
                    .iter()
                    .filter_map(|item| get_nested(item, path))
                    .filter_map(Value::as_object)
                {
                    for (code, entry) in map {
                        if entries.contains_key(code) {
                            continue;
                        }
                        match label_field {
                            Some(field) => {
                                let name = entry.get(field).map(js_string).unwrap_or_default();
                                if !name.is_empty() {
                                    entries.insert(code.clone(), format!("{code} - {name}"));
                                }
                            }
                            None => {
                                entries.insert(code.clone(), code.clone());
                            }
                        }
                    }
                }

                let mut options = vec![FilterOption::new("", all_label_or(all_label))];
                options.extend(
                    entries
                        .into_iter()
                        .map(|(code, label)| FilterOption::new(code, label)),
                );
                options
            }
        }
    }
}

fn all_label_or(label: &Option<String>) -> String {
    label.clone().unwrap_or_else(|| "All".to_string())
}

/// The type of a filter field, with its type-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FilterKind {
    /// Case-insensitive substring search
    Search {
        /// Overrides [`DEFAULT_SEARCH_TARGETS`]
        #[serde(default, skip_serializing_if = "Option::is_none")]
        targets: Option<Vec<String>>,
    },

    /// Exact, case-insensitive match against one option
    Select {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<FilterOption>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options_from: Option<OptionsGenerator>,
        /// The item property is a keyed map; any key may match
        #[serde(default)]
        match_map_keys: bool,
    },

    /// Membership of the item value in a list of allowed values
    MultiSelect {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        options: Vec<FilterOption>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options_from: Option<OptionsGenerator>,
    },

    /// Truthiness equality, or identity with `true`/`false` when strict
    Boolean {
        #[serde(default)]
        strict: bool,
    },

    /// Inclusive date containment
    DateRange,
}

impl FilterKind {
    /// Name used in configuration files and logs
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Search { .. } => "search",
            FilterKind::Select { .. } => "select",
            FilterKind::MultiSelect { .. } => "multiSelect",
            FilterKind::Boolean { .. } => "boolean",
            FilterKind::DateRange => "dateRange",
        }
    }

    /// Neutral value of this kind; a field at this value filters nothing
    pub fn default_value(&self) -> FilterValue {
        match self {
            FilterKind::Search { .. } | FilterKind::Select { .. } => FilterValue::Text(String::new()),
            FilterKind::MultiSelect { .. } => FilterValue::List(Vec::new()),
            FilterKind::Boolean { .. } => FilterValue::Flag(false),
            FilterKind::DateRange => FilterValue::Range(DateRange::default()),
        }
    }

    /// Whether the value has the shape this kind expects
    pub fn accepts(&self, value: &FilterValue) -> bool {
        matches!(
            (self, value),
            (FilterKind::Search { .. }, FilterValue::Text(_))
                | (FilterKind::Select { .. }, FilterValue::Text(_))
                | (FilterKind::MultiSelect { .. }, FilterValue::List(_))
                | (FilterKind::Boolean { .. }, FilterValue::Flag(_))
                | (FilterKind::DateRange, FilterValue::Range(_))
        )
    }

    /// Name of the value shape this kind expects, for error messages
    pub fn expected_shape(&self) -> &'static str {
        match self {
            FilterKind::Search { .. } | FilterKind::Select { .. } => "text",
            FilterKind::MultiSelect { .. } => "list",
            FilterKind::Boolean { .. } => "boolean",
            FilterKind::DateRange => "date range",
        }
    }
}

/// One configured filter dimension of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterFieldSpec {
    /// Unique key within the resource; also the query parameter name
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Item property (dot-path) read by the predicate, defaults to `key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub kind: FilterKind,
}

impl FilterFieldSpec {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            placeholder: None,
            path: None,
            kind,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Item property this field reads
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.key)
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_key(&self.key)
    }

    pub fn default_value(&self) -> FilterValue {
        self.kind.default_value()
    }

    /// Whether `value` is equivalent to this field's neutral value
    pub fn is_default(&self, value: &FilterValue) -> bool {
        *value == self.default_value()
    }

    /// Options offered by a select or multiSelect field
    ///
    /// Generated options take precedence over static ones. Other kinds
    /// have no options.
    pub fn options(&self, items: &[Value]) -> Vec<FilterOption> {
        match &self.kind {
            FilterKind::Select {
                options,
                options_from,
                ..
            }
            | FilterKind::MultiSelect {
                options,
                options_from,
            } => match options_from {
                Some(generator) => generator.generate(items),
                None => options.clone(),
            },
            _ => Vec::new(),
        }
    }
}

/// Inclusive date bounds of a dateRange filter, as ISO date strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl DateRange {
    pub fn new(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    /// Start bound, with an empty string treated as unset
    pub fn start(&self) -> Option<&str> {
        self.start.as_deref().filter(|s| !s.is_empty())
    }

    /// End bound, with an empty string treated as unset
    pub fn end(&self) -> Option<&str> {
        self.end.as_deref().filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.start().is_none() && self.end().is_none()
    }
}

impl PartialEq for DateRange {
    fn eq(&self, other: &Self) -> bool {
        self.start() == other.start() && self.end() == other.end()
    }
}

/// The value held by a filter field
///
/// Deserializes untagged: a string is text, an array a list, a boolean a
/// flag and an object a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// search / select
    Text(String),
    /// multiSelect
    List(Vec<String>),
    /// boolean
    Flag(bool),
    /// dateRange
    Range(DateRange),
}

impl FilterValue {
    pub fn text(s: impl Into<String>) -> Self {
        FilterValue::Text(s.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }

    pub fn range(start: Option<&str>, end: Option<&str>) -> Self {
        FilterValue::Range(DateRange::new(start, end))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FilterValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Whether the value carries no user input at all
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(s) => s.is_empty(),
            FilterValue::List(l) => l.is_empty(),
            FilterValue::Flag(_) => false,
            FilterValue::Range(r) => r.is_empty(),
        }
    }
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterValue::Text(a), FilterValue::Text(b)) => a == b,
            (FilterValue::List(a), FilterValue::List(b)) => {
                let mut a: Vec<&String> = a.iter().collect();
                let mut b: Vec<&String> = b.iter().collect();
                a.sort();
                a.dedup();
                b.sort();
                b.dedup();
                a == b
            }
            (FilterValue::Flag(a), FilterValue::Flag(b)) => a == b,
            (FilterValue::Range(a), FilterValue::Range(b)) => a == b,
            _ => false,
        }
    }
}
