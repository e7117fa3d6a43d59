//! Command-style entry points: `set-state`, `get-state`, `register-listener`.
//!
//! Each command accepts optional arguments. Anything missing is asked for
//! through a [`Prompter`]; if it is still missing the command is cancelled
//! with [`ServiceError::MissingArgument`] before touching the store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::errors::ServiceError;
use crate::state_store::{StateStore, StateUpdate};

#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask the user for a string. `None` when the user cancels.
    async fn prompt(&self, message: &str) -> Result<Option<String>, ServiceError>;
}

/// Prompter for non-interactive hosts: never supplies anything.
pub struct NoPrompt;

#[async_trait]
impl Prompter for NoPrompt {
    async fn prompt(&self, _message: &str) -> Result<Option<String>, ServiceError> {
        Ok(None)
    }
}

/// Null and blank strings count as absent, everything else is a value.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub struct StateCommands {
    store: Arc<StateStore>,
    prompter: Arc<dyn Prompter>,
}

impl StateCommands {
    pub fn new(store: Arc<StateStore>, prompter: Arc<dyn Prompter>) -> Self {
        Self { store, prompter }
    }

    pub async fn set_state(&self, key: Option<String>, value: Option<Value>) -> Result<StateUpdate, ServiceError> {
        let key = self.require(key, "Enter the key for the state you want to set", "Key").await?;
        let value = match value.filter(|v| !is_missing(v)) {
            Some(v) => v,
            None => {
                let prompt = format!("Enter the value for the state key '{key}'");
                Value::String(self.require(None, &prompt, "Value").await?)
            }
        };
        let update = StateUpdate::new(key, value);
        self.store.update_store_state(update.clone()).await?;
        info!(key = %update.key, value = %update.value, "state updated");
        Ok(update)
    }

    pub async fn get_state(&self, key: Option<String>) -> Result<Option<Value>, ServiceError> {
        let key = self.require(key, "Enter the key for the state you want to retrieve", "Key").await?;
        self.store.get(&key).await
    }

    pub async fn register_listener(
        &self,
        key: Option<String>,
        callback: Option<String>,
    ) -> Result<(String, String), ServiceError> {
        let key = self.require(key, "Enter the key for the listener", "Key").await?;
        let callback = self
            .require(callback, "Enter the callback command for the listener", "Callback command")
            .await?;
        self.store.register_listener(&key, &callback).await?;
        Ok((key, callback))
    }

    async fn require(&self, given: Option<String>, message: &str, what: &'static str) -> Result<String, ServiceError> {
        if let Some(v) = given.filter(|v| !v.trim().is_empty()) {
            return Ok(v);
        }
        match self.prompter.prompt(message).await? {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ServiceError::MissingArgument(what)),
        }
    }
}
