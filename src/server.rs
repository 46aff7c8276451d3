//! HTTP Server
//!
//! Assembles the router with its middleware and runs it until Ctrl-C or
//! SIGTERM.

use axum::extract::Request;
use axum::routing::get;
use axum::{Json, Router, ServiceExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::Layer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{self, ApiState};
use crate::config::GameConfig;
use crate::storage::GameStorage;

// ============================================================================
// ROUTER
// ============================================================================

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application. Trailing slashes are trimmed before routing, so
/// `/api/missions/` and `/api/missions` reach the same handler.
pub fn build_app(state: Arc<ApiState>, max_body_bytes: usize) -> NormalizePath<Router> {
    let router = Router::new()
        .route("/health", get(health_check))
        .merge(api::routes())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    NormalizePathLayer::trim_trailing_slash().layer(router)
}

// ============================================================================
// SERVER STARTUP
// ============================================================================

pub async fn run_server(config: GameConfig, storage: Arc<dyn GameStorage>) -> anyhow::Result<()> {
    let state = Arc::new(ApiState::new(storage, config.auth.clone()));
    let app = build_app(state, config.server.max_body_bytes);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let backend = if config.database.url.is_some() {
        "postgresql"
    } else {
        "sqlite"
    };

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║               Genome Quest - Game Backend                    ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Listening on: {:44} ║", addr);
    info!("║  Storage:      {:44} ║", backend);
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Endpoints:                                                  ║");
    info!("║    GET  /health                  - Health check              ║");
    info!("║    POST /api/register            - Register a player         ║");
    info!("║    POST /api/login               - Obtain a token            ║");
    info!("║    *    /api/missions            - Missions (+ /:id/start)   ║");
    info!("║    *    /api/puzzles             - Puzzles per mission       ║");
    info!("║    *    /api/submissions         - Submit and review answers ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
