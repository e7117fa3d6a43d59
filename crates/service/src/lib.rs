//! Shared, persistent key-value state with change notification.
//! - `store` persists writes and announces them on the `notifier`.
//! - `dispatcher` runs the callback identifiers registered per key.
//! - `state_store` is the facade handed to hosts; `commands` adapts it to
//!   prompt-driven entry points.

pub mod errors;
pub mod storage;
pub mod notifier;
pub mod store;
pub mod actions;
pub mod dispatcher;
pub mod state_store;
pub mod commands;
pub mod observability;
pub mod runtime;
#[cfg(test)]
pub mod test_support;

pub use errors::ServiceError;
pub use state_store::{StateStore, StateUpdate};
