//! The API surface the state store offers to its host.
//!
//! [`StateStore::start`] wires the persistent store, the change notifier and
//! the listener dispatcher together; [`StateStore::shutdown`] tears the
//! subscriptions down again. Nothing here is global: hosts pass the returned
//! `Arc<StateStore>` to whoever needs it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::actions::ActionInvoker;
use crate::dispatcher::{DispatchOptions, ListenerDispatcher};
use crate::errors::ServiceError;
use crate::notifier::{ChangeEvent, ChangeHandler, ChangeNotifier, Subscription};
use crate::store::{ListenerKey, PersistentStore};
use crate::storage::StateBackend;

/// A single `{key, value}` write request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub key: String,
    pub value: Value,
}

impl StateUpdate {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self { key: key.into(), value }
    }
}

/// Forwards state changes of one key to a plain callback.
struct KeyListener<F> {
    key: String,
    callback: F,
}

#[async_trait::async_trait]
impl<F> ChangeHandler for KeyListener<F>
where
    F: Fn(&Value) + Send + Sync,
{
    async fn on_change(&self, event: &ChangeEvent) -> Result<(), ServiceError> {
        if event.is_state_key(&self.key) {
            (self.callback)(&event.value);
        }
        Ok(())
    }
}

pub struct StateStore {
    store: Arc<PersistentStore>,
    notifier: Arc<ChangeNotifier>,
    dispatcher: Arc<ListenerDispatcher>,
}

impl StateStore {
    /// Build the store and install the listener dispatcher as the first subscriber.
    pub async fn start(
        values: Arc<dyn StateBackend>,
        listeners: Arc<dyn StateBackend>,
        invoker: Arc<dyn ActionInvoker>,
        options: DispatchOptions,
    ) -> Arc<Self> {
        let notifier = ChangeNotifier::new();
        let store = Arc::new(PersistentStore::new(values, listeners, Arc::clone(&notifier)));
        let dispatcher = Arc::new(ListenerDispatcher::new(&store, invoker, options));
        notifier.subscribe(dispatcher.clone()).await;
        info!(event = "state_store_started", "state store is now active");
        Arc::new(Self { store, notifier, dispatcher })
    }

    /// Persist the update; listeners run before this returns.
    pub async fn update_store_state(&self, update: StateUpdate) -> Result<(), ServiceError> {
        self.store.set(&update.key, update.value).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, ServiceError> {
        self.store.get(key).await
    }

    /// Call `callback` with the new value whenever `key` is written.
    pub async fn store_listener<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler = KeyListener { key: key.into(), callback };
        self.notifier.subscribe(Arc::new(handler)).await
    }

    /// Raw subscription to every change event, listener-list writes included.
    pub async fn subscribe(&self, handler: Arc<dyn ChangeHandler>) -> Subscription {
        self.notifier.subscribe(handler).await
    }

    pub async fn register_listener(&self, key: &str, callback_id: &str) -> Result<(), ServiceError> {
        self.dispatcher.register_listener(key, callback_id).await
    }

    pub async fn listeners(&self, key: &str) -> Result<Vec<String>, ServiceError> {
        self.store.listeners(&ListenerKey::for_key(key)).await
    }

    pub fn persistent(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<ListenerDispatcher> {
        &self.dispatcher
    }

    /// Drop every subscription, the dispatcher included. Writes still persist
    /// afterwards but notify nobody.
    pub async fn shutdown(&self) {
        self.notifier.clear().await;
        info!(event = "state_store_stopped", "state store subscriptions cleared");
    }
}
