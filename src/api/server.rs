use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::config::Config;
use crate::provider::EmbeddingProvider;

/// Captured frames arrive as base64 JSON; allow well above axum's 2 MiB default.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the models failed to load at startup.
    pub provider: Option<Arc<dyn EmbeddingProvider>>,
    pub threshold: f32,
    pub embedding_dim: usize,
}

impl AppState {
    pub fn new(cfg: &Config, provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            provider,
            threshold: cfg.threshold,
            embedding_dim: cfg.embedding_dim,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/generate-embedding", post(handlers::generate_embedding))
        .route("/verify-face", post(handlers::verify_face))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    log::info!("Face embedding service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
