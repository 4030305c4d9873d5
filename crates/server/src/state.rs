use std::sync::Arc;

use animedex_core::{AnimeAggregator, AnimeCache, Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    aggregator: Arc<AnimeAggregator>,
}

impl AppState {
    pub fn new(config: Config, aggregator: Arc<AnimeAggregator>) -> Self {
        Self { config, aggregator }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn aggregator(&self) -> &Arc<AnimeAggregator> {
        &self.aggregator
    }

    pub fn cache(&self) -> &Arc<AnimeCache> {
        self.aggregator.cache()
    }
}
