//! Storage implementations for resource backends
//!
//! The REST backend lives in [`crate::client`]; this module holds the
//! backends that need no network.

pub mod in_memory;

pub use in_memory::{ApiOperation, InMemoryResourceApi};
