//! Storage abstractions for the state store
//!
//! The persistence collaborator is anything implementing [`StateBackend`]:
//! a JSON file-backed map for real deployments and an in-memory map for tests
//! and ephemeral hosts.

pub mod json_map_store;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ServiceError;

pub use json_map_store::JsonMapStore;
pub use memory::MemoryBackend;

/// Persistence collaborator: async get/update by string key, no schema.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, ServiceError>;
    /// Resolves only once the write is acknowledged by the underlying medium.
    async fn update(&self, key: &str, value: Value) -> Result<(), ServiceError>;
}
