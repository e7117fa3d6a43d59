use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::ActionInvoker;
use crate::dispatcher::DispatchOptions;
use crate::errors::ServiceError;
use crate::state_store::StateStore;
use crate::storage::{MemoryBackend, StateBackend};

/// Backend whose writes always fail; reads see nothing.
pub struct FailingBackend;

#[async_trait]
impl StateBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, ServiceError> {
        Ok(None)
    }

    async fn update(&self, _key: &str, _value: Value) -> Result<(), ServiceError> {
        Err(ServiceError::Persistence("disk unavailable".into()))
    }
}

/// In-memory backend that yields to the scheduler around every access, so
/// concurrent callers interleave the way file I/O makes them.
pub struct YieldingBackend(MemoryBackend);

impl YieldingBackend {
    pub fn new() -> Self {
        Self(MemoryBackend::new())
    }
}

#[async_trait]
impl StateBackend for YieldingBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, ServiceError> {
        tokio::task::yield_now().await;
        let value = self.0.get(key).await;
        tokio::task::yield_now().await;
        value
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), ServiceError> {
        tokio::task::yield_now().await;
        self.0.update(key, value).await
    }
}

/// Invocation as seen by [`RecordingInvoker`]: `(action, key, value)`.
pub type Call = (String, String, Value);

/// Records every invocation in order; actions listed in `failing` return an error
/// after being recorded.
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<Call>>,
    failing: HashSet<String>,
}

impl RecordingInvoker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(actions: &[&str]) -> Arc<Self> {
        Arc::new(Self { calls: Mutex::new(Vec::new()), failing: actions.iter().map(|a| a.to_string()).collect() })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|(a, _, _)| a).collect()
    }
}

#[async_trait]
impl ActionInvoker for RecordingInvoker {
    async fn execute(&self, action: &str, key: &str, value: &Value) -> Result<Value, ServiceError> {
        self.calls.lock().unwrap().push((action.to_string(), key.to_string(), value.clone()));
        if self.failing.contains(action) {
            return Err(ServiceError::callback(action, "refused"));
        }
        Ok(Value::Null)
    }
}

/// Store on in-memory backends wired to `invoker`.
pub async fn memory_state_store(invoker: Arc<dyn ActionInvoker>, options: DispatchOptions) -> Arc<StateStore> {
    StateStore::start(Arc::new(MemoryBackend::new()), Arc::new(MemoryBackend::new()), invoker, options).await
}
