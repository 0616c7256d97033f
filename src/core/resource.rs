//! Resource table orchestration
//!
//! A [`ResourceTable`] owns the items of one configured resource and wires
//! the filter store, pagination and selection around them. Mutations go
//! through the [`ResourceApi`] and are reconciled by re-fetching the list;
//! when that re-fetch fails the mutation is applied locally instead.
//!
//! Failures are reported twice: as the returned error, and as a queued
//! [`Notification`] for the presentation layer. Authentication failures are
//! not notified since the credential layer deals with them.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{ActionsConfig, AppSettings, ResourceConfig};
use crate::core::error::{ResourceError, TabulaError, TabulaResult, ValidationError};
use crate::core::field::{FilterOption, FilterValue, SortDirection, is_reserved_key};
use crate::core::filters::{FilterEngine, FilterState, FilterStore};
use crate::core::notify::{Notification, Notifications};
use crate::core::pagination::{DEFAULT_PAGE_SIZE, Page, Pagination, PaginationMeta};
use crate::core::selection::Selection;
use crate::core::service::ResourceApi;
use crate::core::sync::{DebouncePolicy, QueryPort};
use crate::core::validation::FormValidator;
use crate::core::value::{ItemId, explicit_item_id, item_id};

/// Loading lifecycle of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Loading,
    Ready,
}

/// What the table currently has to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewState {
    Loading,
    /// The resource has no items at all
    Empty,
    /// Items exist but none passes the filters
    NoMatches,
    Populated,
}

/// Outcome of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteReport {
    pub deleted: Vec<ItemId>,
    pub failed: Vec<(ItemId, String)>,
}

impl BulkDeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Items, filters, pagination and selection of one resource
pub struct ResourceTable {
    config: ResourceConfig,
    api: Arc<dyn ResourceApi>,
    filters: FilterStore,
    pagination: Pagination,
    selection: Selection,
    validator: FormValidator,
    items: Vec<Value>,
    load_state: LoadState,
    notifications: Notifications,
}

impl std::fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTable")
            .field("resource", &self.config.id)
            .field("items", &self.items.len())
            .field("load_state", &self.load_state)
            .field("filters", &self.filters)
            .field("pagination", &self.pagination)
            .finish()
    }
}

impl ResourceTable {
    /// Table with the default application settings
    ///
    /// Filters and pagination follow the query `port` when the resource is
    /// URL-synced and a port is given, and live in memory otherwise.
    pub fn new(
        config: ResourceConfig,
        api: Arc<dyn ResourceApi>,
        port: Option<Arc<dyn QueryPort>>,
    ) -> TabulaResult<Self> {
        Self::with_settings(config, &AppSettings::default(), api, port)
    }

    /// Table honouring application settings
    ///
    /// A resource left at the library page size takes the application's
    /// default page size instead.
    pub fn with_settings(
        mut config: ResourceConfig,
        settings: &AppSettings,
        api: Arc<dyn ResourceApi>,
        port: Option<Arc<dyn QueryPort>>,
    ) -> TabulaResult<Self> {
        if config.table.default_page_size == DEFAULT_PAGE_SIZE {
            config.table.default_page_size = settings.default_page_size;
        }
        let engine = config.filter_engine();
        let policy = config.debounce_policy(settings);
        Self::with_engine(config, engine, policy, api, port)
    }

    /// Table around a prepared filter engine, e.g. one carrying custom
    /// filter or sort functions
    pub fn with_engine(
        config: ResourceConfig,
        engine: FilterEngine,
        policy: DebouncePolicy,
        api: Arc<dyn ResourceApi>,
        port: Option<Arc<dyn QueryPort>>,
    ) -> TabulaResult<Self> {
        config.validate()?;
        let validator = config.form_validator()?;
        let engine = Arc::new(engine);
        let page_size = config.table.default_page_size;

        let (filters, pagination) = match port {
            Some(port) if config.is_url_synced() => (
                FilterStore::url_synced(engine, port.clone(), policy),
                Pagination::url_synced(port, page_size),
            ),
            _ => (FilterStore::in_memory(engine), Pagination::in_memory(page_size)),
        };

        tracing::info!(
            resource = %config.id,
            url_synced = filters.is_url_synced(),
            "resource table created"
        );

        Ok(Self {
            config,
            api,
            filters,
            pagination,
            selection: Selection::new(),
            validator,
            items: Vec::new(),
            load_state: LoadState::Loading,
            notifications: Notifications::default(),
        })
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn actions(&self) -> ActionsConfig {
        self.config.actions
    }

    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Every loaded item, unfiltered
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    pub fn view_state(&self) -> ViewState {
        if self.is_loading() {
            ViewState::Loading
        } else if self.items.is_empty() {
            ViewState::Empty
        } else if self.filters.apply(&self.items).is_empty() {
            ViewState::NoMatches
        } else {
            ViewState::Populated
        }
    }

    fn id_field(&self) -> Option<&str> {
        self.config.id_field.as_deref()
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    /// Load the item list
    ///
    /// On failure the table is left empty and an error notification is
    /// queued, unless the failure is an authentication one.
    pub async fn fetch(&mut self) -> TabulaResult<usize> {
        self.load_state = LoadState::Loading;
        tracing::debug!(resource = %self.config.id, "fetching items");

        let result = self.api.fetch_list().await;
        self.load_state = LoadState::Ready;

        match result {
            Ok(items) => {
                self.replace_items(items);
                tracing::info!(resource = %self.config.id, count = self.items.len(), "items loaded");
                Ok(self.items.len())
            }
            Err(e) => {
                self.items.clear();
                self.selection.clear();
                tracing::warn!(resource = %self.config.id, error = %e, "failed to fetch items");
                if !e.is_auth() {
                    self.notifications.push(Notification::error(e.to_string()));
                }
                Err(e)
            }
        }
    }

    fn normalize_item(&self, mut item: Value, index: usize) -> Value {
        let id = item_id(&item, self.id_field(), index);
        if let Some(map) = item.as_object_mut() {
            map.insert("id".to_string(), Value::String(id));
        }
        item
    }

    fn replace_items(&mut self, items: Vec<Value>) {
        self.items = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| self.normalize_item(item, index))
            .collect();
        let ids = self.item_ids();
        self.selection.retain_existing(&ids);
    }

    fn item_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| item_id(item, self.id_field(), index))
            .collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .position(|(index, item)| item_id(item, self.id_field(), index) == id)
    }

    /// Re-fetch after a mutation; false when the list could not be loaded
    async fn refetch(&mut self) -> bool {
        match self.api.fetch_list().await {
            Ok(items) => {
                self.replace_items(items);
                true
            }
            Err(e) => {
                tracing::warn!(resource = %self.config.id, error = %e, "refetch failed, applying change locally");
                false
            }
        }
    }

    fn ensure_enabled(&self, enabled: bool, operation: &str) -> TabulaResult<()> {
        if enabled {
            Ok(())
        } else {
            Err(ResourceError::OperationNotSupported {
                resource: self.config.id.clone(),
                operation: operation.to_string(),
            }
            .into())
        }
    }

    fn notify_failure(&mut self, error: &TabulaError) {
        if !error.is_auth() {
            self.notifications.push(Notification::error(error.to_string()));
        }
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Validate the form data of a submission
    pub fn validate_form(&self, item: &Value) -> Result<(), ValidationError> {
        self.validator.validate(item)
    }

    /// Create an item, returning it as stored by the backend
    pub async fn create_item(&mut self, item: Value) -> TabulaResult<Value> {
        self.ensure_enabled(self.config.actions.enable_create, "create")?;
        self.validate_form(&item)?;

        let created = match self.api.create(item).await {
            Ok(created) => created,
            Err(e) => {
                self.notify_failure(&e);
                return Err(e);
            }
        };

        if !self.refetch().await {
            let created = self.normalize_item(created.clone(), self.items.len());
            self.items.insert(0, created);
        }
        self.notifications.push(Notification::success("Item created successfully"));
        Ok(created)
    }

    /// Update the item `id`, returning it as stored by the backend
    pub async fn update_item(&mut self, id: &str, item: Value) -> TabulaResult<Value> {
        self.ensure_enabled(self.config.actions.enable_edit, "update")?;
        if id.is_empty() {
            return Err(ResourceError::MissingId {
                resource: self.config.id.clone(),
            }
            .into());
        }
        self.validate_form(&item)?;

        let updated = match self.api.update(id, item).await {
            Ok(updated) => updated,
            Err(e) => {
                self.notify_failure(&e);
                return Err(e);
            }
        };

        if !self.refetch().await
            && let Some(index) = self.position(id)
        {
            let mut replacement = updated.clone();
            if explicit_item_id(&replacement, self.id_field()).is_none()
                && let Some(map) = replacement.as_object_mut()
            {
                map.insert("id".to_string(), Value::String(id.to_string()));
            }
            self.items[index] = self.normalize_item(replacement, index);
        }
        self.notifications.push(Notification::success("Item updated successfully"));
        Ok(updated)
    }

    /// Delete the item `id`
    pub async fn delete_item(&mut self, id: &str) -> TabulaResult<()> {
        self.ensure_enabled(self.config.actions.enable_delete, "delete")?;
        if id.is_empty() {
            return Err(ResourceError::MissingId {
                resource: self.config.id.clone(),
            }
            .into());
        }

        if let Err(e) = self.api.delete(id).await {
            self.notify_failure(&e);
            return Err(e);
        }

        if !self.refetch().await
            && let Some(index) = self.position(id)
        {
            self.items.remove(index);
        }
        self.selection.unselect(id);
        self.notifications.push(Notification::success("Item deleted successfully"));
        Ok(())
    }

    /// Delete several items, one request each
    ///
    /// Every id is attempted; failures do not stop the batch. Successful
    /// deletions leave the table and the selection is cleared.
    pub async fn bulk_delete_items(&mut self, ids: &[ItemId]) -> TabulaResult<BulkDeleteReport> {
        self.ensure_enabled(
            self.config.actions.enable_selection && self.config.actions.enable_bulk_delete,
            "bulk delete",
        )?;

        let mut report = BulkDeleteReport::default();
        for id in ids.iter().filter(|id| !id.is_empty()) {
            match self.api.delete(id).await {
                Ok(()) => report.deleted.push(id.clone()),
                Err(e) => {
                    tracing::warn!(resource = %self.config.id, id = %id, error = %e, "bulk delete item failed");
                    report.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        if !report.deleted.is_empty() {
            if !self.refetch().await {
                let id_field = self.config.id_field.clone();
                let mut index = 0;
                self.items.retain(|item| {
                    let keep = !report.deleted.contains(&item_id(item, id_field.as_deref(), index));
                    index += 1;
                    keep
                });
            }
            self.selection.clear();
        }

        let first_error = report
            .failed
            .first()
            .map(|(_, message)| message.as_str())
            .unwrap_or("Unknown error");
        let notification = if report.failed.is_empty() {
            Notification::success(format!("Successfully deleted {} item(s)", report.deleted.len()))
        } else if report.deleted.is_empty() {
            Notification::error(format!("Failed to delete items: {first_error}"))
        } else {
            Notification::error(format!(
                "Deleted {} item(s), but {} failed: {first_error}",
                report.deleted.len(),
                report.failed.len()
            ))
        };
        self.notifications.push(notification);

        Ok(report)
    }

    /// Delete every selected item
    pub async fn bulk_delete_selected(&mut self) -> TabulaResult<BulkDeleteReport> {
        let ids: Vec<ItemId> = self.selection.ids().cloned().collect();
        self.bulk_delete_items(&ids).await
    }

    // ---------------------------------------------------------------------
    // Filters and sort
    // ---------------------------------------------------------------------

    /// Set or clear a filter
    ///
    /// In-memory tables go back to the first page; URL-synced tables reset
    /// the page through the query write. Sort keys leave the page alone.
    pub fn set_filter(&mut self, key: &str, value: Option<FilterValue>) -> TabulaResult<()> {
        self.filters.set_filter(key, value)?;
        if !is_reserved_key(key) && !self.pagination.is_url_synced() {
            self.pagination.reset();
        }
        Ok(())
    }

    /// Sort by `key`, toggling the direction when it is already the sort key
    pub fn set_sort(&mut self, key: &str, direction: Option<SortDirection>) {
        self.filters.set_sort(key, direction);
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear_filters();
        if !self.pagination.is_url_synced() {
            self.pagination.reset();
        }
    }

    pub fn filter_state(&self) -> FilterState {
        self.filters.state()
    }

    pub fn has_active_filters(&self) -> bool {
        self.filters.has_active_filters()
    }

    pub fn active_filters_count(&self) -> usize {
        self.filters.active_filters_count()
    }

    /// Options of a select or multiSelect field, generated from the loaded
    /// items when configured so
    pub fn filter_options(&self, key: &str) -> TabulaResult<Vec<FilterOption>> {
        let field = self.config.filter_field(key).ok_or_else(|| ValidationError::UnknownFilter {
            resource: self.config.id.clone(),
            key: key.to_string(),
        })?;
        Ok(field.options(&self.items))
    }

    /// Pick up a query string changed from outside (back/forward navigation)
    ///
    /// Returns whether the filter state changed.
    pub fn on_location_change(&mut self) -> bool {
        let changed = self.filters.sync_from_external();
        if changed {
            tracing::debug!(resource = %self.config.id, "filters adopted from location");
        }
        changed
    }

    // ---------------------------------------------------------------------
    // Views and pagination
    // ---------------------------------------------------------------------

    /// Items passing the filters, in sort order
    pub fn filtered_items(&self) -> Vec<&Value> {
        self.filters.apply(&self.items)
    }

    /// The current page of filtered items
    pub fn page(&self) -> Page<&Value> {
        let filtered = self.filtered_items();
        self.pagination.paginate(&filtered)
    }

    pub fn pagination_meta(&self) -> PaginationMeta {
        self.pagination.meta(self.filtered_items().len())
    }

    pub fn go_to_page(&mut self, page: usize) {
        let total = self.filtered_items().len();
        self.pagination.go_to_page(page, total);
    }

    pub fn next_page(&mut self) {
        let meta = self.pagination_meta();
        if meta.has_next {
            self.go_to_page(meta.page + 1);
        }
    }

    pub fn prev_page(&mut self) {
        let meta = self.pagination_meta();
        if meta.has_prev {
            self.go_to_page(meta.page - 1);
        }
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.pagination.set_page_size(size);
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    fn visible_ids(&self) -> Vec<ItemId> {
        let page = self.page();
        page.items
            .iter()
            .map(|item| item_id(item, self.id_field(), 0))
            .collect()
    }

    pub fn toggle_selected(&mut self, id: &str) -> TabulaResult<()> {
        self.ensure_enabled(self.config.actions.enable_selection, "selection")?;
        self.selection.toggle(id);
        Ok(())
    }

    /// Select every item of the current page, or unselect them all when
    /// they already are
    pub fn toggle_all_visible(&mut self) -> TabulaResult<()> {
        self.ensure_enabled(self.config.actions.enable_selection, "selection")?;
        let ids = self.visible_ids();
        self.selection.toggle_all(&ids);
        Ok(())
    }

    pub fn is_all_visible_selected(&self) -> bool {
        self.selection.is_all_selected(&self.visible_ids())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Selected items, in collection order
    pub fn selected_items(&self) -> Vec<&Value> {
        self.selection.selected_items(&self.items, self.id_field())
    }

    /// Drain queued notifications
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.take()
    }
}
