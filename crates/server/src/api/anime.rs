//! Browse, search and details handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use animedex_core::AnimeRecord;

use super::error::ApiError;
use super::extract::{ApiPath, ApiQuery};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Query parameters for list endpoints.
///
/// `limit` is taken as text so a malformed value gets the standard error body.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailsParams {
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub data: Vec<AnimeRecord>,
    pub count: usize,
}

impl From<Vec<AnimeRecord>> for ListResponse {
    fn from(data: Vec<AnimeRecord>) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

fn parse_limit(raw: Option<&str>) -> Result<Option<u32>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("Invalid limit '{}'", raw))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/trending
pub async fn trending(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let records = state.aggregator().get_trending(limit).await?;
    Ok(Json(records.into()))
}

/// GET /api/v1/top-rated
pub async fn top_rated(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let records = state.aggregator().get_top_rated(limit).await?;
    Ok(Json(records.into()))
}

/// GET /api/v1/new-arrivals
pub async fn new_arrivals(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let records = state.aggregator().get_new_arrivals(limit).await?;
    Ok(Json(records.into()))
}

/// GET /api/v1/genre/{genre}
pub async fn by_genre(
    State(state): State<Arc<AppState>>,
    ApiPath(genre): ApiPath<String>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let records = state.aggregator().get_by_genre(&genre, limit).await?;
    Ok(Json(records.into()))
}

/// GET /api/v1/search?q=
///
/// A missing or blank `q` is rejected before any provider is called.
pub async fn search(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let query = params.q.unwrap_or_default();
    let records = state.aggregator().search(&query, limit).await?;
    Ok(Json(records.into()))
}

/// GET /api/v1/details/{id}?source=auto|jikan|anilist|kitsu
pub async fn details(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(params): ApiQuery<DetailsParams>,
) -> Result<Json<DataResponse<AnimeRecord>>, ApiError> {
    let source = params.source.unwrap_or_else(|| "auto".to_string());
    let record = state.aggregator().get_details(&id, &source).await?;
    Ok(Json(DataResponse::new(record)))
}
