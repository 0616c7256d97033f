//! Core module containing the filter, sort and pagination engine

pub mod compare;
pub mod error;
pub mod field;
pub mod filters;
pub mod notify;
pub mod pagination;
pub mod predicate;
pub mod query;
pub mod resource;
pub mod selection;
pub mod service;
pub mod sync;
pub mod validation;
pub mod value;

pub use error::{ApiError, ConfigError, ResourceError, TabulaError, TabulaResult, ValidationError};
pub use field::{
    DateRange, FilterFieldSpec, FilterKind, FilterOption, FilterValue, OptionsGenerator,
    SortDirection, SortSpec,
};
pub use filters::{FilterEngine, FilterState, FilterStore};
pub use notify::{Notification, NotificationKind};
pub use pagination::{Page, Pagination, PaginationMeta};
pub use resource::{BulkDeleteReport, LoadState, ResourceTable, ViewState};
pub use selection::Selection;
pub use service::ResourceApi;
pub use sync::{DebouncePolicy, InMemoryQueryPort, QueryPort};
