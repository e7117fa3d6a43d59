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
pub struct SetValueBody {
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    match state.commands.get_state(Some(key.clone())).await? {
        Some(value) => Ok((StatusCode::OK, Json(json!({ "key": key, "value": value })))),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "error": format!("state key '{key}' is not set") })))),
    }
}

/// `PUT /state/:key` with `{"value": ...}`
pub async fn put_state(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetValueBody>,
) -> Result<Json<Value>, ApiError> {
    let update = state.commands.set_state(Some(key), body.value).await?;
    Ok(Json(json!({ "ok": true, "key": update.key, "value": update.value })))
}

/// `POST /state` with `{"key": ..., "value": ...}`, the body shape of `updateStoreState`.
pub async fn post_state(
    State(state): State<AppState>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Value>, ApiError> {
    let update = state.commands.set_state(body.key, body.value).await?;
    Ok(Json(json!({ "ok": true, "key": update.key, "value": update.value })))
}
