use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::ServiceError;
use super::StateBackend;

/// Process-local backend; contents are gone when the process exits.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, ServiceError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), ServiceError> {
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
