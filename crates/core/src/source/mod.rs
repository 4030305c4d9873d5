//! Upstream metadata sources.
//!
//! Each provider implements [`SourceAdapter`]. Adapters only talk to the
//! network; normalization, caching and persistence happen above them.

mod anilist;
mod http;
mod jikan;
mod kitsu;
mod rate_limiter;

pub use anilist::AniListSource;
pub use http::{RetryPolicy, SourceHttp};
pub use jikan::JikanSource;
pub use kitsu::KitsuSource;
pub use rate_limiter::{RateLimiter, TokenBucket};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::anime::{Provider, RawPayload};
use crate::config::SourcesConfig;

/// Errors reported by a source adapter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Upstream error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },
}

impl SourceError {
    pub fn upstream(message: impl Into<String>) -> Self {
        SourceError::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Whether a bounded retry may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::RateLimited | SourceError::Timeout => true,
            SourceError::Upstream { status, .. } => matches!(status, Some(s) if *s >= 500),
            SourceError::NotFound(_) => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::RateLimited => "rate_limited",
            SourceError::NotFound(_) => "not_found",
            SourceError::Timeout => "timeout",
            SourceError::Upstream { .. } => "error",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if let Some(status) = e.status() {
            SourceError::Upstream {
                status: Some(status.as_u16()),
                message: e.to_string(),
            }
        } else {
            SourceError::upstream(e.to_string())
        }
    }
}

/// A list query against one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceQuery {
    Trending { limit: u32 },
    TopRated { limit: u32 },
    NewArrivals { limit: u32 },
    Genre { genre: String, limit: u32 },
    Search { query: String, limit: u32 },
}

impl SourceQuery {
    pub fn limit(&self) -> u32 {
        match self {
            SourceQuery::Trending { limit }
            | SourceQuery::TopRated { limit }
            | SourceQuery::NewArrivals { limit }
            | SourceQuery::Genre { limit, .. }
            | SourceQuery::Search { limit, .. } => *limit,
        }
    }

    /// Operation name, as used in logs and metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            SourceQuery::Trending { .. } => "trending",
            SourceQuery::TopRated { .. } => "top_rated",
            SourceQuery::NewArrivals { .. } => "new_arrivals",
            SourceQuery::Genre { .. } => "genre",
            SourceQuery::Search { .. } => "search",
        }
    }
}

/// Capability interface for one upstream provider.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Run a list query, returning one raw payload per title.
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawPayload>, SourceError>;

    /// Fetch a single title by its provider-native id.
    async fn fetch_details(&self, native_id: &str) -> Result<RawPayload, SourceError>;
}

/// Build adapters for every enabled provider, in configured priority order.
pub fn build_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn SourceAdapter>>, SourceError> {
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for provider in config.ordered_providers() {
        let provider_config = config.provider(provider);
        let source: Arc<dyn SourceAdapter> = match provider {
            Provider::Jikan => Arc::new(JikanSource::new(provider_config)?),
            Provider::AniList => Arc::new(AniListSource::new(provider_config)?),
            Provider::Kitsu => Arc::new(KitsuSource::new(provider_config)?),
        };
        sources.push(source);
    }
    Ok(sources)
}

/// Take the array at `pointer` out of a response body.
pub(crate) fn take_list(body: &mut serde_json::Value, pointer: &str) -> Result<Vec<serde_json::Value>, SourceError> {
    match body.pointer_mut(pointer).map(serde_json::Value::take) {
        Some(serde_json::Value::Array(items)) => Ok(items),
        Some(serde_json::Value::Null) | None => Err(SourceError::upstream(format!(
            "Response is missing '{}'",
            pointer
        ))),
        Some(_) => Err(SourceError::upstream(format!(
            "Response field '{}' is not a list",
            pointer
        ))),
    }
}

/// Take the object at `pointer` out of a response body.
pub(crate) fn take_object(body: &mut serde_json::Value, pointer: &str) -> Result<serde_json::Value, SourceError> {
    match body.pointer_mut(pointer).map(serde_json::Value::take) {
        Some(value @ serde_json::Value::Object(_)) => Ok(value),
        _ => Err(SourceError::upstream(format!(
            "Response is missing object '{}'",
            pointer
        ))),
    }
}

/// Clamp a list limit into what a provider page can return.
pub(crate) fn page_size(limit: u32, max: u32) -> u32 {
    limit.clamp(1, max)
}
