use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use qr_core::types::{Query, RouteResponse};
use qr_router::QuotaSnapshot;
use serde_json::{json, Value};
use tracing::{debug, info};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/query", post(route_query))
        .route("/api/v1/quota", get(list_quota))
        .route("/api/v1/quota/{tier}", get(get_quota))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/cache", delete(clear_cache))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let available = state.router.quota().available_tiers().len();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "available_tiers": available,
        "cache_entries": state.router.cache().len(),
    }))
}

/// Always answers with a RouteResponse; a failed local path maps to 503.
async fn route_query(
    State(state): State<AppState>,
    body: Result<Json<Query>, JsonRejection>,
) -> Result<(StatusCode, Json<RouteResponse>), ApiError> {
    let Json(query) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    debug!(mode = %query.options.mode, len = query.text.len(), "query received");

    let response = state.router.route(query).await;
    let status = if response.success { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((status, Json(response)))
}

async fn list_quota(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tiers": state.router.quota_snapshot() }))
}

async fn get_quota(
    State(state): State<AppState>,
    Path(tier): Path<String>,
) -> Result<Json<QuotaSnapshot>, ApiError> {
    // Unknown names surface as UnknownTier -> 404.
    state.router.quota().tier(&tier)?;
    state
        .router
        .quota_snapshot()
        .into_iter()
        .find(|s| s.name == tier)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("tier '{tier}'")))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "router": state.router.stats(),
        "cache": state.router.cache().stats(),
        "cache_entries": state.router.cache().len(),
    }))
}

async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.router.cache().clear();
    info!("response cache cleared");
    StatusCode::NO_CONTENT
}
