//! Runtime environment helpers
//!
//! Turns an [`configs::AppConfig`] into a running [`StateStore`]: ensures the
//! data directory, opens the configured backends and registers the configured
//! webhook actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use configs::{ActionConfig, AppConfig, BackendKind, StorageConfig};
use tracing::info;

use crate::actions::{ActionRegistry, WebhookAction};
use crate::dispatcher::DispatchOptions;
use crate::errors::ServiceError;
use crate::state_store::StateStore;
use crate::storage::{JsonMapStore, MemoryBackend, StateBackend};

/// Ensure the data directory exists.
pub async fn ensure_env(data_dir: &str) -> anyhow::Result<()> {
    common::env::ensure_env(data_dir).await
}

pub type Backends = (Arc<dyn StateBackend>, Arc<dyn StateBackend>);

/// Open the value and listener backends described by `cfg`.
pub async fn open_backends(cfg: &StorageConfig) -> anyhow::Result<Backends> {
    match cfg.backend {
        BackendKind::Memory => {
            info!(backend = "memory", "state kept in memory only");
            let values: Arc<dyn StateBackend> = Arc::new(MemoryBackend::new());
            let listeners: Arc<dyn StateBackend> = Arc::new(MemoryBackend::new());
            Ok((values, listeners))
        }
        BackendKind::File => {
            ensure_env(&cfg.data_dir).await?;
            let values = JsonMapStore::<String, Value>::new(cfg.state_path()).await?;
            let listeners = JsonMapStore::<String, Value>::new(cfg.listeners_path()).await?;
            info!(backend = "file", state = %values.path().display(), listeners = %listeners.path().display(), "state files opened");
            let values: Arc<dyn StateBackend> = values;
            let listeners: Arc<dyn StateBackend> = listeners;
            Ok((values, listeners))
        }
    }
}

/// Registry holding one webhook action per configured identifier.
pub async fn action_registry_from_config(
    actions: &BTreeMap<String, ActionConfig>,
) -> Result<Arc<ActionRegistry>, ServiceError> {
    let registry = Arc::new(ActionRegistry::new());
    let client = reqwest::Client::new();
    for (id, action) in actions {
        registry.register(id, WebhookAction::new(id.clone(), &action.url, client.clone())?).await;
    }
    Ok(registry)
}

/// Open backends and start a store whose callbacks resolve through `registry`.
pub async fn start_from_config(cfg: &AppConfig, registry: Arc<ActionRegistry>) -> anyhow::Result<Arc<StateStore>> {
    let (values, listeners) = open_backends(&cfg.storage).await?;
    let store = StateStore::start(values, listeners, registry, DispatchOptions::from(&cfg.dispatch)).await;
    Ok(store)
}
