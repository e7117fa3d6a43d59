//! Action-invocation collaborator.
//!
//! Listener callbacks are opaque identifiers; an [`ActionInvoker`] resolves an
//! identifier to something executable and runs it with the changed `(key, value)`.

pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::ServiceError;

pub use webhook::WebhookAction;

#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn execute(&self, action: &str, key: &str, value: &Value) -> Result<Value, ServiceError>;
}

/// A single named action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, key: &str, value: &Value) -> Result<Value, ServiceError>;
}

/// Adapts a plain closure into an [`ActionHandler`].
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&str, &Value) -> Result<Value, ServiceError> + Send + Sync,
{
    async fn handle(&self, key: &str, value: &Value) -> Result<Value, ServiceError> {
        (self.0)(key, value)
    }
}

/// In-process table of named actions. Unknown identifiers are an error.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the action behind `name`.
    pub async fn register<H>(&self, name: &str, handler: H)
    where
        H: ActionHandler + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(name.to_string(), Arc::new(handler));
        debug!(action = %name, "action registered");
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ActionInvoker for ActionRegistry {
    async fn execute(&self, action: &str, key: &str, value: &Value) -> Result<Value, ServiceError> {
        // release the lock before running; actions may register other actions
        let handler = self.handlers.read().await.get(action).cloned();
        match handler {
            Some(handler) => handler.handle(key, value).await,
            None => Err(ServiceError::UnknownAction(action.to_string())),
        }
    }
}
