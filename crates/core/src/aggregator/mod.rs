//! Aggregation service.
//!
//! Resolves browse, search and details queries through the cache layer,
//! falling back across providers in priority order:
//! - **Hit**: served from cache with no upstream call
//! - **Miss**: first provider to answer wins, results are persisted and cached
//! - **Failure**: every provider's error is collected into one result

mod service;
mod types;

pub use service::{AnimeAggregator, AnimeCache};
pub use types::{AggregatorError, DetailsSource, ProviderFailure, WarmupFailure, WarmupReport};
