use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::notifier::{ChangeEvent, ChangeNotifier, Namespace};
use crate::observability::{STATE_WRITES_TOTAL, STATE_WRITE_FAILURES_TOTAL};
use crate::storage::StateBackend;

/// Names the callback list registered for a state key.
///
/// Listener lists live in their own backend, so a listener key can never
/// collide with a user key even if the user key ends in `-listeners`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerKey(String);

impl ListenerKey {
    pub fn for_key(key: &str) -> Self {
        Self(key.to_string())
    }

    /// The state key this list belongs to.
    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-listeners", self.0)
    }
}

/// Owns the authoritative key-value mapping and announces every acknowledged write.
pub struct PersistentStore {
    values: Arc<dyn StateBackend>,
    listeners: Arc<dyn StateBackend>,
    notifier: Arc<ChangeNotifier>,
}

impl PersistentStore {
    pub fn new(
        values: Arc<dyn StateBackend>,
        listeners: Arc<dyn StateBackend>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self { values, listeners, notifier }
    }

    /// Write `value` under `key` and publish exactly one change event once the
    /// backend acknowledged it. Unchanged values are published too.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), ServiceError> {
        self.write(Namespace::State, key, value).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, ServiceError> {
        self.values.get(key).await
    }

    /// Callback identifiers registered for the key, in registration order.
    pub async fn listeners(&self, key: &ListenerKey) -> Result<Vec<String>, ServiceError> {
        match self.listeners.get(key.key()).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ServiceError::Persistence(format!("{key} does not hold a list of callback identifiers: {e}"))
            }),
        }
    }

    pub async fn set_listeners(&self, key: &ListenerKey, list: Vec<String>) -> Result<(), ServiceError> {
        self.write(Namespace::Listeners, key.key(), Value::from(list)).await
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    async fn write(&self, namespace: Namespace, key: &str, value: Value) -> Result<(), ServiceError> {
        let backend = match namespace {
            Namespace::State => &self.values,
            Namespace::Listeners => &self.listeners,
        };
        if let Err(e) = backend.update(key, value.clone()).await {
            STATE_WRITE_FAILURES_TOTAL.inc();
            warn!(%key, ?namespace, error = %e, "write rejected; no change event published");
            return Err(e);
        }
        STATE_WRITES_TOTAL.inc();
        debug!(%key, ?namespace, "write acknowledged");

        let event = ChangeEvent { namespace, key: key.to_string(), value };
        self.notifier.publish(&event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ChangeHandler, FnHandler};
    use crate::storage::MemoryBackend;
    use crate::test_support::FailingBackend;
    use serde_json::json;
    use std::sync::Mutex;

    fn memory_store() -> PersistentStore {
        PersistentStore::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryBackend::new()), ChangeNotifier::new())
    }

    async fn capture(store: &PersistentStore) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn ChangeHandler> = Arc::new(FnHandler(move |e: &ChangeEvent| -> Result<(), ServiceError> {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        }));
        store.notifier().subscribe(handler).await;
        seen
    }

    #[tokio::test]
    async fn set_then_get_returns_value() -> Result<(), ServiceError> {
        let store = memory_store();
        assert_eq!(store.get("verseRef").await?, None);
        store.set("verseRef", json!("GEN.1.1")).await?;
        assert_eq!(store.get("verseRef").await?, Some(json!("GEN.1.1")));
        store.set("list", json!(["a", "b"])).await?;
        assert_eq!(store.get("list").await?, Some(json!(["a", "b"])));
        Ok(())
    }

    #[tokio::test]
    async fn every_write_publishes_in_order() -> Result<(), ServiceError> {
        let store = memory_store();
        let seen = capture(&store).await;

        store.set("k", json!("v1")).await?;
        store.set("k", json!("v2")).await?;
        // same value again is not de-duplicated
        store.set("k", json!("v2")).await?;

        let values: Vec<Value> = seen.lock().unwrap().iter().map(|e| e.value.clone()).collect();
        assert_eq!(values, vec![json!("v1"), json!("v2"), json!("v2")]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_publishes_nothing() {
        let store = PersistentStore::new(Arc::new(FailingBackend), Arc::new(MemoryBackend::new()), ChangeNotifier::new());
        let seen = capture(&store).await;

        let res = store.set("k", json!(1)).await;
        assert!(matches!(res, Err(ServiceError::Persistence(_))));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listener_namespace_is_separate() -> Result<(), ServiceError> {
        let store = memory_store();
        let seen = capture(&store).await;
        let lk = ListenerKey::for_key("verseRef");
        assert_eq!(lk.to_string(), "verseRef-listeners");

        assert!(store.listeners(&lk).await?.is_empty());
        store.set_listeners(&lk, vec!["highlight.jump".into()]).await?;
        assert_eq!(store.listeners(&lk).await?, vec!["highlight.jump".to_string()]);

        // a user key spelled like the legacy listener key does not collide
        store.set("verseRef-listeners", json!("plain value")).await?;
        assert_eq!(store.listeners(&lk).await?, vec!["highlight.jump".to_string()]);
        assert_eq!(store.get("verseRef").await?, None);

        let events = seen.lock().unwrap().clone();
        assert_eq!(events[0].namespace, Namespace::Listeners);
        assert_eq!(events[0].key, "verseRef");
        assert_eq!(events[1].namespace, Namespace::State);
        Ok(())
    }
}
