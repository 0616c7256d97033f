//! Query string synchronization
//!
//! The query string is reached through a [`QueryPort`], so the filter store
//! never touches a browser or router directly. [`UrlSync`] owns the port, the
//! debounce policy, the single pending delayed write and the snapshot used to
//! break read/write cycles.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::field::{FilterKind, FilterValue};
use crate::core::filters::{FilterEngine, FilterState};
use crate::core::query::{QueryParams, WriteOptions, read_filters, write_filters};

/// Default delay of debounced query writes
pub const DEFAULT_DEBOUNCE_MS: u64 = 800;

/// Read/replace access to the current query string
pub trait QueryPort: Send + Sync {
    /// Current query parameters
    fn read(&self) -> QueryParams;

    /// Replace the query parameters without adding a history entry
    fn replace(&self, params: QueryParams);
}

/// Query port held in memory
///
/// Records every [`replace`](QueryPort::replace) so tests can assert on the
/// writes, and simulates back/forward navigation with
/// [`navigate`](Self::navigate).
#[derive(Debug, Default)]
pub struct InMemoryQueryPort {
    current: Mutex<QueryParams>,
    writes: Mutex<Vec<QueryParams>>,
}

impl InMemoryQueryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Port starting at the given query string
    pub fn with_query(query: &str) -> Self {
        Self {
            current: Mutex::new(QueryParams::parse(query)),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Change the query string from outside, as a navigation would
    pub fn navigate(&self, query: &str) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = QueryParams::parse(query);
    }

    /// Every write made through the port, oldest first
    pub fn writes(&self) -> Vec<QueryParams> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Current query string, form-urlencoded
    pub fn query_string(&self) -> String {
        self.read().to_string()
    }
}

impl QueryPort for InMemoryQueryPort {
    fn read(&self) -> QueryParams {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn replace(&self, params: QueryParams) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = params;
    }
}

/// How changes of one filter kind reach the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Immediate,
    Debounced(Duration),
}

/// Filter kind to write mode table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    pub search: WriteMode,
    pub select: WriteMode,
    pub multi_select: WriteMode,
    pub boolean: WriteMode,
    pub date_range: WriteMode,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self::with_delay(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }
}

impl DebouncePolicy {
    /// Search and multiSelect debounced by `delay`, everything else immediate
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            search: WriteMode::Debounced(delay),
            select: WriteMode::Immediate,
            multi_select: WriteMode::Debounced(delay),
            boolean: WriteMode::Immediate,
            date_range: WriteMode::Immediate,
        }
    }

    /// Every kind written immediately
    pub fn immediate() -> Self {
        Self {
            search: WriteMode::Immediate,
            select: WriteMode::Immediate,
            multi_select: WriteMode::Immediate,
            boolean: WriteMode::Immediate,
            date_range: WriteMode::Immediate,
        }
    }

    pub fn mode_for(&self, kind: &FilterKind) -> WriteMode {
        match kind {
            FilterKind::Search { .. } => self.search,
            FilterKind::Select { .. } => self.select,
            FilterKind::MultiSelect { .. } => self.multi_select,
            FilterKind::Boolean { .. } => self.boolean,
            FilterKind::DateRange => self.date_range,
        }
    }
}

/// A cancellable delayed callback on the tokio runtime
///
/// Dropping the handle aborts the task, so a callback never fires after its
/// owner is gone.
#[derive(Debug)]
pub struct DelayedTask {
    handle: Option<JoinHandle<()>>,
}

impl DelayedTask {
    /// Run `f` after `delay`
    ///
    /// Returns `None` when called outside a tokio runtime.
    pub fn spawn<F>(delay: Duration, f: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = Handle::try_current().ok()?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        Some(Self {
            handle: Some(handle),
        })
    }

    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the handle without aborting the task
    pub fn detach(mut self) {
        self.handle.take();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// What to do with the query string after a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// State and query string agree; drop any pending write
    CancelPending,
    /// Cancel any pending write and write now
    WriteNow,
    /// Replace the pending write with one firing after the delay
    Debounce(Duration),
}

/// Decide how to bring the query string in line with `state`
///
/// `url_state` is the state currently encoded in the query string.
pub fn plan(
    engine: &FilterEngine,
    state: &FilterState,
    url_state: &FilterState,
    policy: &DebouncePolicy,
) -> SyncAction {
    if state == url_state {
        return SyncAction::CancelPending;
    }

    if state.sort_by != url_state.sort_by || state.sort_order != url_state.sort_order {
        return SyncAction::WriteNow;
    }

    let changed: BTreeSet<&str> = state
        .values
        .keys()
        .chain(url_state.values.keys())
        .map(String::as_str)
        .filter(|key| state.values.get(*key) != url_state.values.get(*key))
        .collect();

    let mut delay: Option<Duration> = None;
    for key in changed {
        // unknown keys are dropped by normalization, reserved keys by routing
        let Some(field) = engine.field(key) else {
            return SyncAction::WriteNow;
        };
        match policy.mode_for(&field.kind) {
            WriteMode::Immediate => return SyncAction::WriteNow,
            WriteMode::Debounced(d) => {
                let cleared = state.values.get(key).is_none_or(FilterValue::is_empty);
                let url_has_value = url_state.values.get(key).is_some_and(|v| !v.is_empty());
                if cleared && url_has_value {
                    return SyncAction::WriteNow;
                }
                delay = Some(delay.map_or(d, |current| current.max(d)));
            }
        }
    }

    match delay {
        Some(delay) => SyncAction::Debounce(delay),
        None => SyncAction::CancelPending,
    }
}

/// Query string synchronization state of one filter store
pub struct UrlSync {
    port: Arc<dyn QueryPort>,
    policy: DebouncePolicy,
    pending: Option<(u64, DelayedTask)>,
    pending_options: Option<WriteOptions>,
    generation: u64,
    last_seen: FilterState,
}

impl std::fmt::Debug for UrlSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSync")
            .field("policy", &self.policy)
            .field("pending", &self.pending.is_some())
            .field("pending_options", &self.pending_options)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}

impl UrlSync {
    /// Attach to a port, returning the synchronizer and the state it encodes
    pub fn new(port: Arc<dyn QueryPort>, policy: DebouncePolicy, engine: &FilterEngine) -> (Self, FilterState) {
        let initial = read_filters(&port.read(), engine);
        let sync = Self {
            port,
            policy,
            pending: None,
            pending_options: None,
            generation: 0,
            last_seen: initial.clone(),
        };
        (sync, initial)
    }

    pub fn port(&self) -> &Arc<dyn QueryPort> {
        &self.port
    }

    pub fn policy(&self) -> &DebouncePolicy {
        &self.policy
    }

    /// State currently encoded in the query string
    pub fn url_state(&self, engine: &FilterEngine) -> FilterState {
        read_filters(&self.port.read(), engine)
    }

    /// Options applied to the next write
    pub fn request_options(&mut self, options: WriteOptions) {
        self.pending_options = Some(options);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending write and its options
    pub fn cancel_pending(&mut self) {
        self.cancel_task();
        self.pending_options = None;
    }

    /// Drop the pending write, keeping requested options for the next one
    pub fn cancel_task(&mut self) {
        if let Some((generation, task)) = self.pending.take() {
            tracing::debug!(generation, "cancelling pending query write");
            task.cancel();
        }
    }

    /// Install a new pending write, superseding the previous one
    ///
    /// `spawn` receives the generation of the new write and returns its
    /// delayed task, or `None` when no runtime is available, in which case
    /// the caller must write immediately.
    pub fn schedule<F>(&mut self, spawn: F) -> bool
    where
        F: FnOnce(u64) -> Option<DelayedTask>,
    {
        if let Some((_, task)) = self.pending.take() {
            task.cancel();
        }
        self.generation += 1;
        match spawn(self.generation) {
            Some(task) => {
                self.pending = Some((self.generation, task));
                true
            }
            None => false,
        }
    }

    /// Claim the pending write of `generation`
    ///
    /// Returns false when that write has been cancelled or superseded.
    pub fn claim(&mut self, generation: u64) -> bool {
        match self.pending.take() {
            Some((current, task)) if current == generation => {
                task.detach();
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// Write `state` now, consuming any requested options
    ///
    /// A requested page preservation only holds when no filter value changes
    /// with this write. The port is only touched when the encoded parameters
    /// differ from the current ones.
    pub fn write(&mut self, engine: &FilterEngine, state: &FilterState) {
        let mut options = self.pending_options.take().unwrap_or_default();
        let current = self.port.read();
        if options.preserve_page && read_filters(&current, engine).values != state.values {
            options.preserve_page = false;
        }
        let next = write_filters(&current, state, engine, options);
        if next != current {
            tracing::debug!(resource = %engine.resource(), query = %next, "writing filters to query");
            self.port.replace(next);
        }
        self.last_seen = state.clone();
    }

    /// Observe the query string after an outside change
    ///
    /// Returns the state it encodes when that differs from the last state
    /// observed or written; `None` means the change is ours or irrelevant.
    pub fn observe(&mut self, engine: &FilterEngine) -> Option<FilterState> {
        let observed = self.url_state(engine);
        if observed == self.last_seen {
            return None;
        }
        self.last_seen = observed.clone();
        Some(observed)
    }
}
