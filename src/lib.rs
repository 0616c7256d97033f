//! # Tabula
//!
//! Configuration-driven resource tables for admin back-offices.
//!
//! ## Features
//!
//! - **Declarative Resources**: Filter fields, table defaults, actions and form
//!   rules declared per resource in YAML
//! - **Filtering**: search, select, multi-select, boolean and date-range filters
//!   evaluated over JSON items
//! - **Sorting**: natural-order comparison with date and numeric awareness
//! - **Pagination**: clamped pages that survive filter changes
//! - **URL Synchronization**: filter, sort and page state mirrored into a query
//!   string, with debounced writes for free-text input
//! - **REST Backends**: token-aware JSON client with refresh-and-retry (feature
//!   `http`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabula::prelude::*;
//!
//! let config = ResourcesConfig::default_config();
//! let countries = config.require_resource("countries")?.clone();
//! let api = Arc::new(RestResourceApi::from_config(&countries, Credentials::default())?);
//! let port = Arc::new(InMemoryQueryPort::with_query("region=Asia"));
//!
//! let mut table = ResourceTable::new(countries, api, Some(port))?;
//! table.fetch().await?;
//!
//! table.set_filter("search", Some(FilterValue::text("land")))?;
//! for country in table.page().items {
//!     println!("{}", country["name"]["common"]);
//! }
//! ```

#[cfg(feature = "http")]
pub mod client;
pub mod config;
pub mod core;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        error::{
            ApiError, ConfigError, ErrorResponse, FieldValidationError, ResourceError,
            TabulaError, TabulaResult, ValidationError,
        },
        field::{
            DateRange, FilterFieldSpec, FilterKind, FilterOption, FilterValue, OptionsGenerator,
            SortDirection, SortSpec,
        },
        filters::{CustomFilter, CustomSort, FilterEngine, FilterState, FilterStore},
        notify::{Notification, NotificationKind},
        pagination::{DEFAULT_PAGE_SIZE, Page, Pagination, PaginationMeta, paginate},
        query::{QueryParams, WriteOptions, read_filters, write_filters},
        resource::{BulkDeleteReport, LoadState, ResourceTable, ViewState},
        selection::Selection,
        service::ResourceApi,
        sync::{DebouncePolicy, InMemoryQueryPort, QueryPort, WriteMode},
        validation::{FormFieldRule, FormValidator},
        value::ItemId,
    };

    // === Storage ===
    pub use crate::storage::{ApiOperation, InMemoryResourceApi};

    // === Config ===
    pub use crate::config::{
        ActionsConfig, ApiConfig, AppSettings, EndpointConfig, HttpMethod, ResourceConfig,
        ResourcesConfig, SyncMode, TokenRequirement,
    };

    // === Client ===
    #[cfg(feature = "http")]
    pub use crate::client::{
        ApiResponse, Credentials, InMemoryTokenStore, RestClient, RestResourceApi, Token,
        TokenRefresher, TokenStore,
    };

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
