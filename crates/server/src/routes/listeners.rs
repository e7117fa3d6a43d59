use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::errors::ApiError;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    #[serde(default)]
    pub callback: Option<String>,
}

pub async fn list_listeners(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let listeners = state.store.listeners(&key).await?;
    Ok(Json(json!({ "key": key, "listeners": listeners })))
}

/// Append a callback identifier; duplicates are kept.
pub async fn register_listener(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (key, callback) = state.commands.register_listener(Some(key), body.callback).await?;
    let listeners = state.store.listeners(&key).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "key": key, "callback": callback, "listeners": listeners }))))
}
