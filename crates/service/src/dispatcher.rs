//! Invokes registered callback identifiers when a state key changes.
//!
//! The dispatcher is a permanent [`ChangeHandler`] installed once when the
//! store starts. For every state-namespace change it reads the key's listener
//! list and runs each callback in registration order, awaiting one before
//! starting the next. Listener-list writes are never dispatched, so a listener
//! can't be attached to another key's listener list.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use configs::{DispatchConfig, FailurePolicy};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::actions::ActionInvoker;
use crate::errors::ServiceError;
use crate::notifier::{ChangeEvent, ChangeHandler, Namespace};
use crate::observability::{CALLBACK_FAILURES_TOTAL, CALLBACK_INVOCATIONS_TOTAL};
use crate::store::{ListenerKey, PersistentStore};

tokio::task_local! {
    // nesting level of dispatch passes on the current task
    static DISPATCH_DEPTH: usize;
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub failure_policy: FailurePolicy,
    /// `None` waits for a callback indefinitely.
    pub callback_timeout: Option<Duration>,
    /// Nested dispatch passes allowed when callbacks write back into the store.
    pub max_depth: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self { failure_policy: FailurePolicy::Continue, callback_timeout: None, max_depth: 8 }
    }
}

impl From<&DispatchConfig> for DispatchOptions {
    fn from(cfg: &DispatchConfig) -> Self {
        Self {
            failure_policy: cfg.failure_policy,
            callback_timeout: cfg.callback_timeout_ms.map(Duration::from_millis),
            max_depth: cfg.max_depth,
        }
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
    /// Empty identifiers in the list.
    pub skipped: usize,
    /// A failure stopped the pass under [`FailurePolicy::Abort`].
    pub aborted: bool,
}

pub struct ListenerDispatcher {
    // weak: the store owns the notifier, which owns this dispatcher
    store: Weak<PersistentStore>,
    invoker: Arc<dyn ActionInvoker>,
    options: DispatchOptions,
    // serializes the read-append-write of listener lists
    registration: Mutex<()>,
}

impl ListenerDispatcher {
    pub fn new(store: &Arc<PersistentStore>, invoker: Arc<dyn ActionInvoker>, options: DispatchOptions) -> Self {
        Self { store: Arc::downgrade(store), invoker, options, registration: Mutex::new(()) }
    }

    fn store(&self) -> Result<Arc<PersistentStore>, ServiceError> {
        self.store
            .upgrade()
            .ok_or_else(|| ServiceError::Persistence("state store already shut down".into()))
    }

    /// Append `callback_id` to the listener list of `key`. Duplicates are kept, so
    /// registering the same identifier twice invokes it twice per change.
    /// Concurrent registrations are applied one at a time, so none is lost.
    /// Subscribers must not register listeners from inside the resulting
    /// `Listeners` change event.
    pub async fn register_listener(&self, key: &str, callback_id: &str) -> Result<(), ServiceError> {
        if key.trim().is_empty() {
            return Err(ServiceError::MissingArgument("Key"));
        }
        if callback_id.trim().is_empty() {
            return Err(ServiceError::MissingArgument("Callback command"));
        }
        let store = self.store()?;
        let listener_key = ListenerKey::for_key(key);
        let _guard = self.registration.lock().await;
        let mut list = store.listeners(&listener_key).await?;
        list.push(callback_id.to_string());
        info!(%key, callback = %callback_id, listeners = list.len(), "registering listener for state change");
        store.set_listeners(&listener_key, list).await
    }

    /// Run every callback registered for `key` with `(key, value)`, in order.
    pub async fn dispatch(&self, key: &str, value: &Value) -> Result<DispatchReport, ServiceError> {
        let store = self.store()?;
        let listener_key = ListenerKey::for_key(key);
        let callbacks = store.listeners(&listener_key).await?;
        let mut report = DispatchReport::default();
        if callbacks.is_empty() {
            return Ok(report);
        }

        for callback in &callbacks {
            if callback.is_empty() {
                report.skipped += 1;
                continue;
            }
            debug!(%key, %callback, total = callbacks.len(), "executing callback for state change");
            report.invoked += 1;
            CALLBACK_INVOCATIONS_TOTAL.inc();
            if let Err(e) = self.invoke(callback, key, value).await {
                report.failed += 1;
                CALLBACK_FAILURES_TOTAL.inc();
                match self.options.failure_policy {
                    FailurePolicy::Continue => {
                        warn!(%key, %callback, error = %e, "callback failed; continuing with next listener");
                    }
                    FailurePolicy::Abort => {
                        warn!(%key, %callback, error = %e, "callback failed; aborting remaining listeners");
                        report.aborted = true;
                        break;
                    }
                }
            }
        }
        Ok(report)
    }

    async fn invoke(&self, callback: &str, key: &str, value: &Value) -> Result<(), ServiceError> {
        let call = self.invoker.execute(callback, key, value);
        let result = match self.options.callback_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return Err(ServiceError::callback(callback, format!("timed out after {limit:?}"))),
            },
            None => call.await,
        };
        result.map(|_| ()).map_err(|e| match e {
            e @ ServiceError::CallbackInvocation { .. } => e,
            other => ServiceError::callback(callback, other),
        })
    }
}

#[async_trait]
impl ChangeHandler for ListenerDispatcher {
    async fn on_change(&self, event: &ChangeEvent) -> Result<(), ServiceError> {
        if event.namespace != Namespace::State {
            return Ok(());
        }
        let depth = DISPATCH_DEPTH.try_with(|d| *d).unwrap_or(0);
        if depth >= self.options.max_depth {
            warn!(key = %event.key, depth, "dispatch depth limit reached; skipping listeners");
            return Ok(());
        }
        let report = DISPATCH_DEPTH.scope(depth + 1, self.dispatch(&event.key, &event.value)).await?;
        if report.invoked > 0 {
            debug!(
                key = %event.key,
                invoked = report.invoked,
                failed = report.failed,
                aborted = report.aborted,
                "dispatch finished"
            );
        }
        Ok(())
    }
}
