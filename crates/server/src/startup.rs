use std::{env, net::SocketAddr, sync::Arc};

use axum::Router;
use common::utils::logging::init_logging_default;
use configs::AppConfig;
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::errors::StartupError;
use crate::routes::{self, AppState};
use service::runtime;

/// Initialize logging via shared common utils
fn init_logging() {
    init_logging_default();
}

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Load configuration, falling back to defaults when no config file exists.
pub fn load_config() -> Result<AppConfig, StartupError> {
    AppConfig::load_or_default().map_err(|e| StartupError::InvalidConfig(e.to_string()))
}

/// Host/port from config, overridable with `SERVER_HOST` / `SERVER_PORT`.
fn load_bind_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    let host = env::var("SERVER_HOST").unwrap_or_else(|_| cfg.server.host.clone());
    let port = env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(cfg.server.port);
    Ok(format!("{}:{}", host, port).parse()?)
}

/// Router over an already started store.
pub fn build_app(store: Arc<service::StateStore>) -> Router {
    routes::build_router(AppState::new(store), build_cors())
}

/// Public entry: start the store and run the HTTP server until Ctrl+C.
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let cfg = load_config()?;
    let registry = runtime::action_registry_from_config(&cfg.actions).await?;
    let names = registry.names().await;
    info!(actions = ?names, "callback actions registered");
    let store = runtime::start_from_config(&cfg, registry).await?;

    let app = build_app(Arc::clone(&store));

    let addr = load_bind_addr(&cfg)?;
    info!(%addr, "starting state store server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    store.shutdown().await;
    Ok(())
}
