use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use service::ServiceError;
use thiserror::Error;
use tracing::error;

/// Handler error: a [`ServiceError`] rendered as `{"error": "..."}` with a matching status.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ServiceError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::MissingArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::CallbackInvocation { .. } | ServiceError::UnknownAction(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Persistence(_) | ServiceError::Prompt(_) | ServiceError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = self.to_string();
        if status.is_server_error() {
            error!(error = %msg, %status, "request failed");
        }
        (status, Json(serde_json::json!({"error": msg}))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
