//! Configuration loading and management
//!
//! Resources are declared in YAML: their filter fields, table defaults,
//! allowed actions, form rules and REST endpoints.
//!
//! ```yaml
//! settings:
//!   storagePrefix: tabula_
//! resources:
//!   - id: countries
//!     label: Countries
//!     filters:
//!       sync: url-synced
//!       fields:
//!         - key: search
//!           label: Search
//!           type: search
//!         - key: region
//!           label: Region
//!           type: select
//!           optionsFrom: { kind: distinct, path: region, allLabel: All Regions }
//!     table:
//!       defaultPageSize: 15
//!       defaultSort: { key: name.common, direction: asc }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{ConfigError, ResourceError, TabulaResult};
use crate::core::field::{
    FilterFieldSpec, FilterKind, FilterOption, OptionsGenerator, SortDirection, SortSpec,
};
use crate::core::filters::FilterEngine;
use crate::core::pagination::DEFAULT_PAGE_SIZE;
use crate::core::sync::{DEFAULT_DEBOUNCE_MS, DebouncePolicy};
use crate::core::validation::{FormFieldRule, FormValidator};

/// Prefix of persisted credential keys
pub const DEFAULT_STORAGE_PREFIX: &str = "tabula_";

/// Application-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Namespace of persisted credentials
    pub storage_prefix: String,

    /// Page size of resources left at the library default
    pub default_page_size: usize,

    /// Delay of debounced query writes
    pub debounce_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Where filter state lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// In memory only
    #[default]
    Simple,
    /// Mirrored into the query string
    UrlSynced,
}

/// Filter configuration of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersConfig {
    #[serde(default, alias = "type")]
    pub sync: SyncMode,

    /// Overrides the application debounce delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    #[serde(default)]
    pub fields: Vec<FilterFieldSpec>,
}

/// A table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
}

/// Table configuration of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,

    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            default_sort: None,
            columns: Vec::new(),
        }
    }
}

/// Operations allowed on a resource
///
/// Everything is disabled unless configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionsConfig {
    pub enable_selection: bool,
    pub enable_create: bool,
    pub enable_edit: bool,
    pub enable_delete: bool,
    pub enable_bulk_delete: bool,
}

impl ActionsConfig {
    /// Every action enabled
    pub fn all() -> Self {
        Self {
            enable_selection: true,
            enable_create: true,
            enable_edit: true,
            enable_delete: true,
            enable_bulk_delete: true,
        }
    }
}

/// HTTP method of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Credentials a request needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenRequirement {
    /// Send no credentials at all
    Skip,
    /// Send the auth token, else the guest token, else nothing
    #[default]
    Optional,
    /// Fail without an auth or guest token
    Required,
    /// Fail without an auth token
    RequiredAuth,
}

/// One REST endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Path relative to the base URL; `{%}` is replaced by the item id
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRequirement>,
}

impl EndpointConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: None,
            token: None,
        }
    }

    pub fn with_token(mut self, token: TokenRequirement) -> Self {
        self.token = Some(token);
        self
    }
}

/// REST API of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    pub list: EndpointConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<EndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<EndpointConfig>,
    /// Envelope key holding the list, when neither `data` nor `items`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_key: Option<String>,
    /// Extra query parameters of the list request
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query: IndexMap<String, String>,
    /// Convert snake_case response keys to camelCase
    #[serde(default)]
    pub camel_case_keys: bool,
}

/// Complete configuration of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub id: String,
    pub label: String,

    /// Item property holding the row identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,

    #[serde(default)]
    pub filters: FiltersConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form: Vec<FormFieldRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiConfig>,
}

impl ResourceConfig {
    pub fn is_url_synced(&self) -> bool {
        self.filters.sync == SyncMode::UrlSynced
    }

    pub fn filter_field(&self, key: &str) -> Option<&FilterFieldSpec> {
        self.filters.fields.iter().find(|f| f.key == key)
    }

    /// Filter engine interpreting this resource's filter fields
    pub fn filter_engine(&self) -> FilterEngine {
        FilterEngine::new(
            self.id.clone(),
            self.filters.fields.clone(),
            self.table.default_sort.clone(),
        )
    }

    /// Debounce table, with this resource's delay or the application's
    pub fn debounce_policy(&self, settings: &AppSettings) -> DebouncePolicy {
        let ms = self.filters.debounce_ms.unwrap_or(settings.debounce_ms);
        DebouncePolicy::with_delay(Duration::from_millis(ms))
    }

    pub fn form_validator(&self) -> TabulaResult<FormValidator> {
        FormValidator::from_rules(&self.form)
    }

    /// Check the resource for configuration mistakes
    pub fn validate(&self) -> TabulaResult<()> {
        let mut keys = HashSet::new();
        for field in &self.filters.fields {
            if !keys.insert(field.key.as_str()) {
                return Err(ConfigError::DuplicateFilterKey {
                    resource: self.id.clone(),
                    key: field.key.clone(),
                }
                .into());
            }
        }

        if self.table.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.table.defaultPageSize", self.id),
                value: "0".to_string(),
                message: "page size must be at least 1".to_string(),
            }
            .into());
        }

        self.form_validator()?;
        Ok(())
    }
}

/// Complete configuration of the application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub settings: AppSettings,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl ResourcesConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> TabulaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::IoError {
                message: e.to_string(),
            },
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.display().to_string()),
            message: e.to_string(),
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), resources = config.resources.len(), "configuration loaded");
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> TabulaResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Find a resource by id
    pub fn resource(&self, id: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Find a resource by id, failing when it does not exist
    pub fn require_resource(&self, id: &str) -> TabulaResult<&ResourceConfig> {
        self.resource(id).ok_or_else(|| {
            ResourceError::UnknownResource {
                resource: id.to_string(),
            }
            .into()
        })
    }

    /// Check every resource
    pub fn validate(&self) -> TabulaResult<()> {
        let mut ids = HashSet::new();
        for resource in &self.resources {
            if !ids.insert(resource.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "resources.id".to_string(),
                    value: resource.id.clone(),
                    message: "duplicate resource id".to_string(),
                }
                .into());
            }
            resource.validate()?;
        }
        if self.settings.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "settings.defaultPageSize".to_string(),
                value: "0".to_string(),
                message: "page size must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge several configurations
    ///
    /// Later configurations win: a resource with an id already present
    /// replaces the earlier one in place, and the settings of the last
    /// configuration apply.
    pub fn merge(configs: Vec<ResourcesConfig>) -> Self {
        let mut merged = Self::default();
        let mut by_id: IndexMap<String, ResourceConfig> = IndexMap::new();
        for config in configs {
            merged.settings = config.settings;
            for resource in config.resources {
                by_id.insert(resource.id.clone(), resource);
            }
        }
        merged.resources = by_id.into_values().collect();
        merged
    }

    /// Configuration with the built-in `captions` and `countries` resources
    pub fn default_config() -> Self {
        Self {
            settings: AppSettings::default(),
            resources: vec![captions_resource(), countries_resource()],
        }
    }
}

const WORD_PATTERN: &str = r"^[\p{L}\p{N}\s\-'.,!?]+$";

fn word_rule(key: &str, label: &str) -> FormFieldRule {
    FormFieldRule {
        key: key.to_string(),
        label: Some(label.to_string()),
        required: true,
        min_length: Some(2),
        max_length: Some(100),
        pattern: Some(WORD_PATTERN.to_string()),
    }
}

fn column(key: &str, label: &str) -> ColumnConfig {
    ColumnConfig {
        key: key.to_string(),
        label: label.to_string(),
        sortable: true,
        width: None,
    }
}

fn captions_resource() -> ResourceConfig {
    ResourceConfig {
        id: "captions".to_string(),
        label: "Captions".to_string(),
        id_field: Some("_id".to_string()),
        filters: FiltersConfig {
            sync: SyncMode::UrlSynced,
            debounce_ms: None,
            fields: vec![
                FilterFieldSpec::new("search", "Search", FilterKind::Search { targets: None })
                    .with_placeholder("Search captions..."),
                FilterFieldSpec::new(
                    "sortBy",
                    "Sort By",
                    FilterKind::Select {
                        options: vec![
                            FilterOption::new("national", "National"),
                            FilterOption::new("foreign", "Foreign"),
                            FilterOption::new("created_at", "Created Date"),
                        ],
                        options_from: None,
                        match_map_keys: false,
                    },
                ),
                FilterFieldSpec::new("created_at", "Created Date", FilterKind::DateRange),
            ],
        },
        table: TableConfig {
            default_page_size: DEFAULT_PAGE_SIZE,
            default_sort: Some(SortSpec::new("national", SortDirection::Asc)),
            columns: vec![
                column("_id", "ID"),
                column("national", "National"),
                column("foreign", "Foreign"),
                column("created_at", "Created"),
            ],
        },
        actions: ActionsConfig::all(),
        form: vec![
            word_rule("national", "National word"),
            word_rule("foreign", "Foreign word"),
        ],
        api: Some(ApiConfig {
            base_url: "https://lexiconapi.onrender.com".to_string(),
            list: EndpointConfig::new("Api/Client/GetAllWords"),
            create: Some(EndpointConfig::new("Api/Client/AddWord")),
            update: Some(EndpointConfig::new("Api/Client/EditWord/{%}")),
            delete: Some(EndpointConfig::new("Api/Client/DeleteWord/{%}")),
            list_key: None,
            query: IndexMap::new(),
            camel_case_keys: false,
        }),
    }
}

fn countries_resource() -> ResourceConfig {
    let fields = [
        "name",
        "region",
        "capital",
        "currencies",
        "languages",
        "independent",
        "cca2",
        "cca3",
    ];
    ResourceConfig {
        id: "countries".to_string(),
        label: "Countries".to_string(),
        id_field: Some("cca3".to_string()),
        filters: FiltersConfig {
            sync: SyncMode::UrlSynced,
            debounce_ms: None,
            fields: vec![
                FilterFieldSpec::new("search", "Search Countries", FilterKind::Search { targets: None })
                    .with_placeholder("Search by name, capital, or country code..."),
                FilterFieldSpec::new(
                    "region",
                    "Region",
                    FilterKind::Select {
                        options: vec![],
                        options_from: Some(OptionsGenerator::Distinct {
                            path: "region".to_string(),
                            all_label: Some("All Regions".to_string()),
                        }),
                        match_map_keys: false,
                    },
                ),
                FilterFieldSpec::new(
                    "currency",
                    "Currency",
                    FilterKind::Select {
                        options: vec![],
                        options_from: Some(OptionsGenerator::MapKeys {
                            path: "currencies".to_string(),
                            label_field: Some("name".to_string()),
                            all_label: Some("All Currencies".to_string()),
                        }),
                        match_map_keys: true,
                    },
                )
                .with_path("currencies"),
                FilterFieldSpec::new("independent", "Independent Only", FilterKind::Boolean { strict: true }),
            ],
        },
        table: TableConfig {
            default_page_size: DEFAULT_PAGE_SIZE,
            default_sort: Some(SortSpec::new("name.common", SortDirection::Asc)),
            columns: vec![
                column("name.common", "Country"),
                column("region", "Region"),
                column("capital", "Capital"),
                column("currencies", "Currency"),
                column("languages", "Languages"),
                column("independent", "Status"),
            ],
        },
        actions: ActionsConfig::default(),
        form: Vec::new(),
        api: Some(ApiConfig {
            base_url: "https://restcountries.com/v3.1".to_string(),
            list: EndpointConfig::new("all").with_token(TokenRequirement::Skip),
            create: None,
            update: None,
            delete: None,
            list_key: None,
            query: IndexMap::from([("fields".to_string(), fields.join(","))]),
            camel_case_keys: false,
        }),
    }
}
