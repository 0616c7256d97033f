//! In-memory implementation of ResourceApi for testing and development

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::core::error::{ApiError, TabulaResult};
use crate::core::service::ResourceApi;
use crate::core::value::explicit_item_id;

/// Operations of [`ResourceApi`], used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    List,
    Create,
    Update,
    Delete,
}

/// In-memory resource backend
///
/// Useful for testing and development. Uses RwLock for thread-safe access
/// and keeps items in insertion order. Created items receive a UUID `id`
/// and a `created_at` timestamp when they have none.
#[derive(Clone)]
pub struct InMemoryResourceApi {
    resource: String,
    items: Arc<RwLock<IndexMap<String, Value>>>,
    failures: Arc<RwLock<HashMap<ApiOperation, ApiError>>>,
}

impl InMemoryResourceApi {
    /// Create an empty in-memory resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            items: Arc::new(RwLock::new(IndexMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a resource seeded with `items`
    pub fn with_items(resource: impl Into<String>, items: Vec<Value>) -> Self {
        let api = Self::new(resource);
        if let Ok(mut stored) = api.items.write() {
            for item in items {
                let (id, item) = Self::identify(item);
                stored.insert(id, item);
            }
        }
        api
    }

    /// Make every call of `operation` fail with `error`
    pub fn set_failing(&self, operation: ApiOperation, error: ApiError) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(operation, error);
        }
    }

    /// Stop failing `operation`
    pub fn clear_failing(&self, operation: ApiOperation) {
        if let Ok(mut failures) = self.failures.write() {
            failures.remove(&operation);
        }
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, operation: ApiOperation) -> TabulaResult<()> {
        let failures = self
            .failures
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        match failures.get(&operation) {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    /// Key an item by its identity (`id`, `_id` or `cca3`), assigning a
    /// UUID `id` and a creation stamp when missing
    fn identify(mut item: Value) -> (String, Value) {
        let id = explicit_item_id(&item, None).unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(map) = item.as_object_mut() {
            map.entry("id").or_insert_with(|| Value::String(id.clone()));
            map.entry("created_at")
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        }
        (id, item)
    }

    fn not_found(&self, id: &str) -> ApiError {
        ApiError::Http {
            status: 404,
            message: format!("{} item '{}' not found", self.resource, id),
        }
    }
}

#[async_trait]
impl ResourceApi for InMemoryResourceApi {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn fetch_list(&self) -> TabulaResult<Vec<Value>> {
        self.check(ApiOperation::List)?;
        let items = self
            .items
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(items.values().cloned().collect())
    }

    async fn create(&self, item: Value) -> TabulaResult<Value> {
        self.check(ApiOperation::Create)?;
        if !item.is_object() {
            return Err(ApiError::Api {
                message: "Item must be a JSON object".to_string(),
            }
            .into());
        }
        let (id, item) = Self::identify(item);

        let mut items = self
            .items
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        items.insert(id, item.clone());

        Ok(item)
    }

    async fn update(&self, id: &str, item: Value) -> TabulaResult<Value> {
        self.check(ApiOperation::Update)?;
        let mut items = self
            .items
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let stored = items.get_mut(id).ok_or_else(|| self.not_found(id))?;
        if let (Some(target), Value::Object(changes)) = (stored.as_object_mut(), item) {
            for (key, value) in changes {
                target.insert(key, value);
            }
            target.insert("id".to_string(), Value::String(id.to_string()));
        }

        Ok(stored.clone())
    }

    async fn delete(&self, id: &str) -> TabulaResult<()> {
        self.check(ApiOperation::Delete)?;
        let mut items = self
            .items
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        items.shift_remove(id).ok_or_else(|| self.not_found(id))?;
        Ok(())
    }
}
