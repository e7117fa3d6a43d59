pub mod listeners;
pub mod state;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use common::types::Health;
use service::commands::{NoPrompt, StateCommands};
use service::observability::encode_metrics;
use service::StateStore;

/// Shared handler state: the running store plus the command layer over it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub commands: Arc<StateCommands>,
}

impl AppState {
    /// HTTP callers can't be prompted, so missing arguments are rejected outright.
    pub fn new(store: Arc<StateStore>) -> Self {
        let commands = Arc::new(StateCommands::new(Arc::clone(&store), Arc::new(NoPrompt)));
        Self { store, commands }
    }
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics() -> (StatusCode, String) {
    match encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}")),
    }
}

/// Build the full application router
pub fn build_router(app_state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/state", post(state::post_state))
        .route("/state/:key", get(state::get_state).put(state::put_state))
        .route("/listeners/:key", get(listeners::list_listeners).post(listeners::register_listener))
        .with_state(app_state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                // 每次请求创建 span，包含方法和路径，日志级别为 INFO
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_request(
                    DefaultOnRequest::new()
                        .level(Level::DEBUG),
                )
                // 响应返回时打点，包含状态码与耗时
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                // 失败（5xx 等）时以 ERROR 记录
                .on_failure(
                    DefaultOnFailure::new()
                        .level(Level::ERROR),
                )
        )
}
