//! Cache management handlers.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use animedex_core::{CacheHealth, CacheStats, StoreStats, WarmupReport};

use super::anime::DataResponse;
use super::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Persistent store counters, absent when the store cannot be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreStats>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/cache/clear
///
/// Body is optional; without a pattern every entry is removed.
pub async fn clear(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DataResponse<ClearResponse>>, ApiError> {
    let request: ClearRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ClearRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?
    };

    let pattern = request
        .pattern
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    let cleared = state.cache().clear(pattern.as_deref()).await?;
    info!(
        "Cleared {} cache entries (pattern: {})",
        cleared,
        pattern.as_deref().unwrap_or("*")
    );

    Ok(Json(DataResponse::new(ClearResponse { cleared, pattern })))
}

/// GET /api/v1/cache/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<DataResponse<StatsResponse>> {
    let cache = state.cache().stats().await;
    let store = state.aggregator().store().stats().ok();
    Json(DataResponse::new(StatsResponse { cache, store }))
}

/// POST /api/v1/cache/warmup
pub async fn warmup(State(state): State<Arc<AppState>>) -> Json<DataResponse<WarmupReport>> {
    Json(DataResponse::new(state.aggregator().warm_up().await))
}

/// GET /api/v1/cache/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<DataResponse<CacheHealth>> {
    Json(DataResponse::new(state.cache().health().await))
}
