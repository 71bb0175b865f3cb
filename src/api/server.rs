//! HTTP server implementation

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{app_router, AppState};
use crate::client::ModelRuntime;
use crate::config::AppConfig;

/// Router with tracing and, when enabled, permissive CORS.
pub fn build_app(state: AppState) -> Router {
    let cors = state.config.server.cors;
    let mut app = app_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if cors {
        info!("CORS enabled");
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    app
}

/// Start the API server and run until it fails.
pub async fn serve(config: AppConfig, runtime: Arc<dyn ModelRuntime>) -> std::io::Result<()> {
    let addr = config.server.bind_addr();
    let upstream = config.upstream.base_url.clone();
    let app = build_app(AppState::new(runtime, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("OllamaChat listening on http://{}", addr);
    info!("Using Ollama at {}", upstream);
    info!("Available endpoints:");
    info!("  GET  /                          - Chat frontend");
    info!("  GET  /v1/models                 - Local models");
    info!("  POST /v1/chat/completions       - Chat (streaming or not)");
    info!("  GET  /api/models/recommended    - Model catalog");
    info!("  GET  /api/models/search?q=      - Search local and catalog models");
    info!("  GET  /api/models/check/<model>  - Is a model downloaded");
    info!("  POST /api/models/pull           - Download a model (SSE progress)");

    axum::serve(listener, app).await?;

    Ok(())
}
