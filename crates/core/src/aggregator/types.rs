//! Types for the aggregation service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anime::Provider;
use crate::cache::CacheError;
use crate::source::SourceError;

/// One provider's failure while resolving a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: Provider,
    pub error: SourceError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ProviderFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the aggregation service.
///
/// Cloneable so one failed fetch can be handed to every caller coalesced
/// on the same cache key.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregatorError {
    /// A required parameter was missing or invalid.
    #[error("{0}")]
    Validation(String),

    /// Every consulted provider reported the title absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// At least one provider failed and none succeeded.
    #[error("All providers failed for {operation}: {}", join_failures(.failures))]
    UpstreamUnavailable {
        operation: String,
        failures: Vec<ProviderFailure>,
    },

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AggregatorError {
    /// Build the error for a query that no provider could answer.
    ///
    /// Absence is only reported when every provider said so; any other
    /// failure makes the whole query unavailable.
    pub fn from_failures(operation: &str, failures: Vec<ProviderFailure>) -> Self {
        let all_absent = !failures.is_empty()
            && failures
                .iter()
                .all(|f| matches!(f.error, SourceError::NotFound(_)));
        if all_absent {
            AggregatorError::NotFound(format!(
                "{} ({})",
                operation,
                failures
                    .iter()
                    .map(|f| f.provider.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        } else {
            AggregatorError::UpstreamUnavailable {
                operation: operation.to_string(),
                failures,
            }
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregatorError::Validation(_) => "invalid",
            AggregatorError::NotFound(_) => "not_found",
            AggregatorError::UpstreamUnavailable { .. } => "unavailable",
            AggregatorError::Internal(_) => "internal",
        }
    }
}

impl From<CacheError> for AggregatorError {
    fn from(e: CacheError) -> Self {
        AggregatorError::Internal(e.to_string())
    }
}

/// Which providers a details lookup may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailsSource {
    /// Every configured provider, in priority order.
    Auto,
    /// Only the named provider.
    Only(Provider),
}

impl DetailsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailsSource::Auto => "auto",
            DetailsSource::Only(provider) => provider.as_str(),
        }
    }

    pub fn allows(&self, provider: Provider) -> bool {
        match self {
            DetailsSource::Auto => true,
            DetailsSource::Only(only) => *only == provider,
        }
    }
}

impl FromStr for DetailsSource {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(DetailsSource::Auto);
        }
        s.parse::<Provider>().map(DetailsSource::Only).map_err(|_| {
            AggregatorError::Validation(format!(
                "Invalid source '{}': expected auto, jikan, anilist or kitsu",
                s
            ))
        })
    }
}

/// A descriptor that could not be warmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarmupFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of a cache warm-up run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WarmupReport {
    /// Keys that now hold fresh entries.
    pub warmed: Vec<String>,
    pub failed: Vec<WarmupFailure>,
}
