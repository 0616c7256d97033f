//! Filter state, the per-resource filter engine and the filter store
//!
//! [`FilterEngine`] is the immutable interpretation of a resource's filter
//! configuration: it filters and sorts items for a given [`FilterState`].
//! [`FilterStore`] is the mutable, shareable handle that owns the current
//! state and keeps the query string in sync when the resource is
//! URL-synced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::core::compare::compare;
use crate::core::error::{TabulaResult, ValidationError};
use crate::core::field::{
    FilterFieldSpec, FilterValue, SORT_BY_KEY, SORT_ORDER_KEY, SortDirection, SortSpec,
    is_reserved_key,
};
use crate::core::predicate::matches;
use crate::core::query::WriteOptions;
use crate::core::sync::{
    DebouncePolicy, DelayedTask, QueryPort, SyncAction, UrlSync, WriteMode, plan,
};

/// Current filter values and sort of a resource
///
/// `values` only holds fields that deviate from their default. The sort
/// slots hold `None` when equal to the resource's default sort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default)]
    pub values: BTreeMap<String, FilterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortDirection>,
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        self.values.is_empty() && self.sort_by.is_none() && self.sort_order.is_none()
    }
}

/// Replacement for the built-in predicates
pub type CustomFilter = Arc<dyn Fn(&Value, &FilterState) -> bool + Send + Sync>;

/// Replacement for the built-in comparator
pub type CustomSort = Arc<dyn Fn(&mut [&Value], &str, SortDirection) + Send + Sync>;

/// Filters and sorts the items of one resource
#[derive(Clone)]
pub struct FilterEngine {
    resource: String,
    fields: Vec<FilterFieldSpec>,
    default_sort: Option<SortSpec>,
    custom_filter: Option<CustomFilter>,
    custom_sort: Option<CustomSort>,
}

impl fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEngine")
            .field("resource", &self.resource)
            .field("fields", &self.fields)
            .field("default_sort", &self.default_sort)
            .field("custom_filter", &self.custom_filter.is_some())
            .field("custom_sort", &self.custom_sort.is_some())
            .finish()
    }
}

impl FilterEngine {
    pub fn new(
        resource: impl Into<String>,
        fields: Vec<FilterFieldSpec>,
        default_sort: Option<SortSpec>,
    ) -> Self {
        Self {
            resource: resource.into(),
            fields,
            default_sort,
            custom_filter: None,
            custom_sort: None,
        }
    }

    /// Use `filter` instead of the per-field predicates
    pub fn with_custom_filter(mut self, filter: CustomFilter) -> Self {
        self.custom_filter = Some(filter);
        self
    }

    /// Use `sort` instead of the built-in comparator
    pub fn with_custom_sort(mut self, sort: CustomSort) -> Self {
        self.custom_sort = Some(sort);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn fields(&self) -> &[FilterFieldSpec] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FilterFieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn default_sort_by(&self) -> Option<&str> {
        self.default_sort.as_ref().map(|s| s.key.as_str())
    }

    pub fn default_sort_order(&self) -> SortDirection {
        self.default_sort
            .as_ref()
            .map(|s| s.direction)
            .unwrap_or_default()
    }

    pub fn default_state(&self) -> FilterState {
        FilterState::default()
    }

    pub fn is_default_value(&self, field: &FilterFieldSpec, value: &FilterValue) -> bool {
        field.is_default(value)
    }

    /// Sort column and direction in effect, explicit or default
    pub fn effective_sort<'a>(&'a self, state: &'a FilterState) -> (Option<&'a str>, SortDirection) {
        let sort_by = state.sort_by.as_deref().or_else(|| self.default_sort_by());
        let sort_order = state.sort_order.unwrap_or_else(|| self.default_sort_order());
        (sort_by, sort_order)
    }

    /// Bring a state into canonical form
    ///
    /// Drops unknown keys and values at their default, and clears sort slots
    /// equal to the default sort.
    pub fn normalize(&self, mut state: FilterState) -> FilterState {
        state.values.retain(|key, value| {
            self.field(key)
                .is_some_and(|field| !field.is_reserved() && field.kind.accepts(value) && !field.is_default(value))
        });
        if state.sort_by.as_deref().is_some_and(str::is_empty)
            || state.sort_by.as_deref() == self.default_sort_by()
        {
            state.sort_by = None;
        }
        if state.sort_order == Some(self.default_sort_order()) {
            state.sort_order = None;
        }
        state
    }

    /// Keys deviating from their default, including `sortBy` / `sortOrder`
    pub fn active_filters(&self, state: &FilterState) -> BTreeSet<String> {
        let mut active: BTreeSet<String> = self
            .fields
            .iter()
            .filter(|field| !field.is_reserved())
            .filter(|field| {
                state
                    .values
                    .get(&field.key)
                    .is_some_and(|value| !field.is_default(value))
            })
            .map(|field| field.key.clone())
            .collect();

        if state
            .sort_by
            .as_deref()
            .is_some_and(|s| Some(s) != self.default_sort_by())
        {
            active.insert(SORT_BY_KEY.to_string());
        }
        if state
            .sort_order
            .is_some_and(|o| o != self.default_sort_order())
        {
            active.insert(SORT_ORDER_KEY.to_string());
        }
        active
    }

    /// Whether an item passes every configured field
    pub fn item_matches(&self, item: &Value, state: &FilterState) -> bool {
        if let Some(filter) = &self.custom_filter {
            return filter(item, state);
        }
        self.fields
            .iter()
            .filter(|field| !field.is_reserved())
            .all(|field| match state.values.get(&field.key) {
                Some(value) => matches(item, field, value),
                None => true,
            })
    }

    /// Filter then sort `items`
    pub fn apply<'a>(&self, items: &'a [Value], state: &FilterState) -> Vec<&'a Value> {
        let mut result: Vec<&'a Value> = items
            .iter()
            .filter(|item| self.item_matches(item, state))
            .collect();

        let (sort_by, sort_order) = self.effective_sort(state);
        if let Some(sort_by) = sort_by {
            match &self.custom_sort {
                Some(sort) => sort(result.as_mut_slice(), sort_by, sort_order),
                None => result.sort_by(|a, b| compare(a, b, sort_by, sort_order)),
            }
        }
        result
    }

    /// Check a value against the field it is set on
    fn validate(&self, key: &str, value: &FilterValue) -> TabulaResult<()> {
        let field = self.field(key).ok_or_else(|| ValidationError::UnknownFilter {
            resource: self.resource.clone(),
            key: key.to_string(),
        })?;
        if !field.kind.accepts(value) {
            return Err(ValidationError::ValueMismatch {
                key: key.to_string(),
                expected: field.kind.expected_shape().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

struct StoreInner {
    engine: Arc<FilterEngine>,
    state: FilterState,
    sync: Option<UrlSync>,
}

/// Shared handle on the filter state of one resource
///
/// Clones share the same state. Mutations reconcile the query string when
/// the store was built with [`FilterStore::url_synced`].
#[derive(Clone)]
pub struct FilterStore {
    shared: Arc<Mutex<StoreInner>>,
}

impl fmt::Debug for FilterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("FilterStore")
            .field("resource", &inner.engine.resource())
            .field("state", &inner.state)
            .field("sync", &inner.sync)
            .finish()
    }
}

impl FilterStore {
    /// Store held purely in memory
    pub fn in_memory(engine: Arc<FilterEngine>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(StoreInner {
                state: engine.default_state(),
                engine,
                sync: None,
            })),
        }
    }

    /// Store seeded from and synchronized with a query port
    pub fn url_synced(engine: Arc<FilterEngine>, port: Arc<dyn QueryPort>, policy: DebouncePolicy) -> Self {
        let (sync, state) = UrlSync::new(port, policy, &engine);
        tracing::debug!(resource = %engine.resource(), ?state, "filter state seeded from query");
        Self {
            shared: Arc::new(Mutex::new(StoreInner {
                engine,
                state,
                sync: Some(sync),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn engine(&self) -> Arc<FilterEngine> {
        self.lock().engine.clone()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> FilterState {
        self.lock().state.clone()
    }

    pub fn is_url_synced(&self) -> bool {
        self.lock().sync.is_some()
    }

    /// Current value of a field, or its default
    pub fn value(&self, key: &str) -> Option<FilterValue> {
        let inner = self.lock();
        inner
            .state
            .values
            .get(key)
            .cloned()
            .or_else(|| inner.engine.field(key).map(FilterFieldSpec::default_value))
    }

    /// Set or clear one filter
    ///
    /// `None`, or a value equal to the field's default, removes the filter.
    /// The reserved `sortBy` / `sortOrder` keys set the sort instead.
    pub fn set_filter(&self, key: &str, value: Option<FilterValue>) -> TabulaResult<()> {
        let mut inner = self.lock();

        if is_reserved_key(key) {
            let text = match &value {
                None => None,
                Some(FilterValue::Text(text)) => Some(text.as_str()).filter(|s| !s.is_empty()),
                Some(_) => {
                    return Err(ValidationError::ValueMismatch {
                        key: key.to_string(),
                        expected: "text".to_string(),
                    }
                    .into());
                }
            };
            let mut next = inner.state.clone();
            if key == SORT_BY_KEY {
                next.sort_by = text.map(str::to_string);
            } else {
                next.sort_order = text.and_then(SortDirection::parse);
            }
            inner.state = inner.engine.normalize(next);
        } else {
            match value {
                Some(value) => {
                    inner.engine.validate(key, &value)?;
                    let is_default = inner.engine.field(key).is_some_and(|f| f.is_default(&value));
                    if is_default {
                        inner.state.values.remove(key);
                    } else {
                        inner.state.values.insert(key.to_string(), value);
                    }
                }
                None => {
                    if inner.engine.field(key).is_none() {
                        return Err(ValidationError::UnknownFilter {
                            resource: inner.engine.resource().to_string(),
                            key: key.to_string(),
                        }
                        .into());
                    }
                    inner.state.values.remove(key);
                }
            }
        }

        tracing::debug!(resource = %inner.engine.resource(), key, "filter updated");
        self.reconcile(&mut inner);
        Ok(())
    }

    /// Sort by `key`
    ///
    /// An explicit direction wins. Without one, repeating the effective sort
    /// key toggles the direction and a new key sorts ascending. A sort-only
    /// change keeps the current page in the query string.
    pub fn set_sort(&self, key: &str, direction: Option<SortDirection>) {
        let mut inner = self.lock();

        let (current_by, current_order) = inner.engine.effective_sort(&inner.state);
        let next_order = match direction {
            Some(direction) => direction,
            None if current_by == Some(key) => current_order.toggle(),
            None => SortDirection::Asc,
        };

        let sort_changed = current_by != Some(key) || current_order != next_order;

        let mut next = inner.state.clone();
        next.sort_by = Some(key.to_string());
        next.sort_order = Some(next_order);
        inner.state = inner.engine.normalize(next);

        if sort_changed && let Some(sync) = inner.sync.as_mut() {
            sync.request_options(WriteOptions::preserve_page());
        }

        tracing::debug!(resource = %inner.engine.resource(), key, order = %next_order, "sort updated");
        self.reconcile(&mut inner);
    }

    /// Reset every filter and the sort to their defaults
    ///
    /// URL-synced stores write the query string immediately.
    pub fn clear_filters(&self) {
        let mut inner = self.lock();
        inner.state = inner.engine.default_state();

        let StoreInner {
            engine, state, sync, ..
        } = &mut *inner;
        if let Some(sync) = sync.as_mut() {
            sync.cancel_pending();
            sync.write(engine, state);
        }
        tracing::debug!(resource = %engine.resource(), "filters cleared");
    }

    pub fn has_active_filters(&self) -> bool {
        self.active_filters_count() > 0
    }

    pub fn active_filters_count(&self) -> usize {
        let inner = self.lock();
        inner.engine.active_filters(&inner.state).len()
    }

    pub fn active_filters(&self) -> BTreeSet<String> {
        let inner = self.lock();
        inner.engine.active_filters(&inner.state)
    }

    /// Effective sort column
    pub fn sort_by(&self) -> Option<String> {
        let inner = self.lock();
        inner.engine.effective_sort(&inner.state).0.map(str::to_string)
    }

    /// Effective sort direction
    pub fn sort_order(&self) -> SortDirection {
        let inner = self.lock();
        inner.engine.effective_sort(&inner.state).1
    }

    /// Filter and sort `items` with the current state
    pub fn apply<'a>(&self, items: &'a [Value]) -> Vec<&'a Value> {
        let (engine, state) = {
            let inner = self.lock();
            (inner.engine.clone(), inner.state.clone())
        };
        engine.apply(items, &state)
    }

    /// Whether a debounced query write is waiting
    pub fn has_pending_write(&self) -> bool {
        self.lock().sync.as_ref().is_some_and(UrlSync::has_pending)
    }

    /// Delay of debounced writes for the field `key`, if any
    pub fn debounce_delay(&self, key: &str) -> Option<Duration> {
        let inner = self.lock();
        let field = inner.engine.field(key)?;
        match inner.sync.as_ref()?.policy().mode_for(&field.kind) {
            WriteMode::Debounced(delay) => Some(delay),
            WriteMode::Immediate => None,
        }
    }

    /// Adopt the query string after an outside navigation
    ///
    /// Returns true when the filter state changed. Query states this store
    /// wrote itself, or already observed, are ignored.
    pub fn sync_from_external(&self) -> bool {
        let mut inner = self.lock();
        let StoreInner {
            engine, state, sync, ..
        } = &mut *inner;
        let Some(sync) = sync.as_mut() else {
            return false;
        };
        let Some(observed) = sync.observe(engine) else {
            return false;
        };

        sync.cancel_pending();
        if observed == *state {
            return false;
        }
        tracing::debug!(resource = %engine.resource(), ?observed, "filter state taken from query");
        *state = observed;
        true
    }

    /// Bring the query string in line with the state just mutated
    fn reconcile(&self, inner: &mut StoreInner) {
        let StoreInner {
            engine, state, sync, ..
        } = inner;
        let Some(sync) = sync.as_mut() else {
            return;
        };

        let url_state = sync.url_state(engine);
        match plan(engine, state, &url_state, sync.policy()) {
            SyncAction::CancelPending => sync.cancel_pending(),
            SyncAction::WriteNow => {
                sync.cancel_task();
                sync.write(engine, state);
            }
            SyncAction::Debounce(delay) => {
                let weak = Arc::downgrade(&self.shared);
                let scheduled = sync.schedule(|generation| {
                    tracing::debug!(resource = %engine.resource(), generation, ?delay, "query write debounced");
                    DelayedTask::spawn(delay, move || flush_pending(weak, generation))
                });
                if !scheduled {
                    sync.write(engine, state);
                }
            }
        }
    }
}

/// Run a debounced write if it is still the current one
fn flush_pending(shared: Weak<Mutex<StoreInner>>, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
    let StoreInner {
        engine, state, sync, ..
    } = &mut *inner;
    if let Some(sync) = sync.as_mut() {
        if sync.claim(generation) {
            sync.write(engine, state);
        }
    }
}
