//! HTTP front end.
//!
//! Serves the chat page, a health check and the JSON chat endpoint.

pub mod cookie;
pub mod error;
pub mod handlers;

use crate::config::ServerConfig;
use crate::session::SessionManager;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use cookie::CookieSettings;

pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub cookie: CookieSettings,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, config: &ServerConfig) -> Self {
        Self {
            sessions,
            cookie: CookieSettings {
                name: config.cookie_name.clone(),
                max_age_seconds: config.cookie_max_age_seconds,
            },
        }
    }
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/jaltol/", post(handlers::handle_jaltol))
        .route("/jaltol", post(handlers::handle_jaltol))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(address = %addr, "JaltolAI listening");

    axum::serve(listener, create_router(state))
        .await
        .context("Server error")?;
    Ok(())
}
