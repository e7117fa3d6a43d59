//! In-process change notification.
//!
//! [`ChangeNotifier`] is an explicitly constructed publish/subscribe bus. It lives
//! as long as the [`crate::state_store::StateStore`] that created it and holds no
//! state beyond the current subscriber list; subscriptions are not persisted and
//! must be re-established on every start.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::observability::{CHANGE_EVENTS_TOTAL, HANDLER_FAILURES_TOTAL};

/// Which key space a write landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// User-visible state keys.
    State,
    /// Callback identifier lists, one per state key.
    Listeners,
}

/// Ephemeral notification emitted after a successful write. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
}

impl ChangeEvent {
    pub fn state(key: impl Into<String>, value: Value) -> Self {
        Self { namespace: Namespace::State, key: key.into(), value }
    }

    /// True for a user-key change whose key equals `key`.
    pub fn is_state_key(&self, key: &str) -> bool {
        self.namespace == Namespace::State && self.key == key
    }
}

#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self, event: &ChangeEvent) -> Result<(), ServiceError>;
}

/// Adapts a plain closure into a [`ChangeHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ChangeHandler for FnHandler<F>
where
    F: Fn(&ChangeEvent) -> Result<(), ServiceError> + Send + Sync,
{
    async fn on_change(&self, event: &ChangeEvent) -> Result<(), ServiceError> {
        (self.0)(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct ChangeNotifier {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn ChangeHandler>)>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { handlers: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) })
    }

    /// Register a handler that receives every event. Handlers run in registration order.
    pub async fn subscribe(self: &Arc<Self>, handler: Arc<dyn ChangeHandler>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().await.push((id, handler));
        debug!(subscription = id.0, "change handler subscribed");
        Subscription { id, notifier: Arc::downgrade(self) }
    }

    /// Remove a handler; returns whether it was still subscribed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().await;
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        before != handlers.len()
    }

    /// Deliver `event` to every current handler, one after another. A handler
    /// that errors or panics is logged and skipped; the rest still run. Returns
    /// the number of handlers that failed.
    pub async fn publish(&self, event: &ChangeEvent) -> usize {
        // snapshot so handlers may (un)subscribe while being called
        let handlers: Vec<Arc<dyn ChangeHandler>> =
            self.handlers.read().await.iter().map(|(_, h)| Arc::clone(h)).collect();
        CHANGE_EVENTS_TOTAL.inc();

        let mut failures = 0;
        for handler in handlers {
            let error = match AssertUnwindSafe(handler.on_change(event)).catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };
            failures += 1;
            HANDLER_FAILURES_TOTAL.inc();
            warn!(key = %event.key, namespace = ?event.namespace, %error, "change handler failed");
        }
        failures
    }

    pub async fn subscriber_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Drop every subscription. Used at shutdown.
    pub async fn clear(&self) {
        self.handlers.write().await.clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string payload"
    }
}

/// Handle returned by [`ChangeNotifier::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to end it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    notifier: Weak<ChangeNotifier>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn unsubscribe(self) -> bool {
        match self.notifier.upgrade() {
            Some(notifier) => notifier.unsubscribe(self.id).await,
            None => false,
        }
    }
}
