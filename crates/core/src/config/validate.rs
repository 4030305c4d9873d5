use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::anime::Provider;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Cache TTLs and capacity are non-zero
/// - Default limit fits under the max limit
/// - Source order names known, distinct providers and at least one is enabled
/// - Every provider allows at least one attempt
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let cache = &config.cache;
    let ttls = [
        ("trending_ttl_secs", cache.trending_ttl_secs),
        ("top_rated_ttl_secs", cache.top_rated_ttl_secs),
        ("new_arrivals_ttl_secs", cache.new_arrivals_ttl_secs),
        ("genre_ttl_secs", cache.genre_ttl_secs),
        ("search_ttl_secs", cache.search_ttl_secs),
        ("details_ttl_secs", cache.details_ttl_secs),
    ];
    for (name, ttl) in ttls {
        if ttl == 0 {
            return Err(ConfigError::ValidationError(format!(
                "cache.{} cannot be 0",
                name
            )));
        }
    }
    if cache.max_entries == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_entries cannot be 0".to_string(),
        ));
    }

    let aggregator = &config.aggregator;
    if aggregator.default_limit == 0 || aggregator.default_limit > aggregator.max_limit {
        return Err(ConfigError::ValidationError(format!(
            "aggregator.default_limit must be between 1 and max_limit ({})",
            aggregator.max_limit
        )));
    }
    if aggregator.adapter_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "aggregator.adapter_timeout_secs cannot be 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for name in &config.sources.order {
        let provider: Provider = name.parse().map_err(|_| {
            ConfigError::ValidationError(format!("sources.order: unknown provider '{}'", name))
        })?;
        if !seen.insert(provider) {
            return Err(ConfigError::ValidationError(format!(
                "sources.order: provider '{}' listed twice",
                name
            )));
        }
    }
    if config.sources.ordered_providers().is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one source must be enabled and listed in sources.order".to_string(),
        ));
    }

    for provider in Provider::ALL {
        let provider_config = config.sources.provider(provider);
        if provider_config.max_attempts == 0 {
            return Err(ConfigError::ValidationError(format!(
                "sources.{}.max_attempts cannot be 0",
                provider
            )));
        }
        if provider_config.rate_limit_rpm == 0 {
            return Err(ConfigError::ValidationError(format!(
                "sources.{}.rate_limit_rpm cannot be 0",
                provider
            )));
        }
    }

    Ok(())
}
