//! Service trait for resource backends

use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::{ResourceError, TabulaResult};

/// CRUD access to the items of one resource
///
/// Implementations talk to whatever owns the data (a REST backend, an
/// in-memory store). Only listing is mandatory; the mutating operations
/// report [`ResourceError::OperationNotSupported`] unless overridden.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Resource identifier, used in errors and logs
    fn resource(&self) -> &str;

    /// List every item
    async fn fetch_list(&self) -> TabulaResult<Vec<Value>>;

    /// Create an item, returning it as stored
    async fn create(&self, _item: Value) -> TabulaResult<Value> {
        Err(self.unsupported("create"))
    }

    /// Replace the item `id`, returning it as stored
    async fn update(&self, _id: &str, _item: Value) -> TabulaResult<Value> {
        Err(self.unsupported("update"))
    }

    /// Delete the item `id`
    async fn delete(&self, _id: &str) -> TabulaResult<()> {
        Err(self.unsupported("delete"))
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &str) -> crate::core::error::TabulaError {
        ResourceError::OperationNotSupported {
            resource: self.resource().to_string(),
            operation: operation.to_string(),
        }
        .into()
    }
}
