//! API Handlers
//!
//! HTTP request handlers for the cache admin endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::cache::{Cache, MetricsSnapshot, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};
use crate::models::{AckResponse, HealthResponse, InvalidateTagsRequest, StatsResponse};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache facade
    pub cache: Cache,
}

impl AppState {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.backend_name()))
}

/// Handler for GET /cache/stats
///
/// Size, indexed tags, generation and active backend.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().await.into())
}

/// Handler for GET /cache/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.cache.metrics())
}

/// Handler for DELETE /cache/keys/:key
///
/// Succeeds whether or not the key was present.
pub async fn invalidate_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AckResponse>> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        )));
    }

    state.cache.invalidate_key(&key).await;
    Ok(Json(AckResponse::new(format!("Key '{}' invalidated", key))))
}

/// Handler for POST /cache/invalidate
pub async fn invalidate_tags_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateTagsRequest>,
) -> Result<Json<AckResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.invalidate_by_tags(&req.tags).await;
    Ok(Json(AckResponse::new(format!(
        "Invalidated entries tagged {}",
        req.tags.join(", ")
    ))))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Json<AckResponse> {
    info!("Cache clear requested over admin API");
    state.cache.clear().await;
    Json(AckResponse::new("Cache cleared"))
}
