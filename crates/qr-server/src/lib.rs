//! HTTP front for the query router (Axum).
//!
//! Exposes query routing, quota inspection, router statistics and health.

pub mod backends;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use qr_core::config::RouterConfig;
use qr_core::error::Result;
use state::AppState;
use std::sync::Arc;

/// Builds a router wired to the built-in collaborators.
pub fn build_router(config: &RouterConfig) -> Result<qr_router::Router> {
    let remote = backends::HttpRemoteExecutor::new(config.server.remote_endpoint.clone())?;
    qr_router::Router::from_config(
        config,
        Arc::new(backends::RuleBasedLocalExecutor::new()),
        Arc::new(remote),
        Arc::new(backends::KeywordIntentClassifier::new()),
    )
}

/// Build the application with the built-in collaborators.
pub fn app(config: &RouterConfig) -> Result<Router> {
    Ok(app_with_state(AppState::new(build_router(config)?)))
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::query_routes())
        .with_state(state)
}
