use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required argument was absent; nothing was written.
    #[error("Operation cancelled. {0} was missing.")]
    MissingArgument(&'static str),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("callback `{callback}` failed: {reason}")]
    CallbackInvocation { callback: String, reason: String },
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("prompt error: {0}")]
    Prompt(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn persistence(err: impl std::fmt::Display) -> Self { Self::Persistence(err.to_string()) }

    pub fn callback(callback: &str, err: impl std::fmt::Display) -> Self {
        Self::CallbackInvocation { callback: callback.to_string(), reason: err.to_string() }
    }
}
