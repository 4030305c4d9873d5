pub mod aggregator;
pub mod anime;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod normalize;
pub mod source;
pub mod store;
pub mod testing;

pub use aggregator::{
    AggregatorError, AnimeAggregator, AnimeCache, DetailsSource, ProviderFailure, WarmupFailure,
    WarmupReport,
};
pub use anime::{AnimeRecord, AnimeStatus, ImageSet, Provider, RawPayload};
pub use cache::{CacheError, CacheHealth, CacheLayer, CacheStats, QueryDescriptor};
pub use config::{
    load_config, load_config_from_str, validate_config, AggregatorConfig, CacheConfig, Config,
    ConfigError, DatabaseConfig, ProviderConfig, SanitizedConfig, ServerConfig, SourcesConfig,
};
pub use normalize::{normalize, normalize_payload, NormalizeError};
pub use source::{build_sources, SourceAdapter, SourceError, SourceQuery};
pub use store::{AnimeStore, SqliteAnimeStore, StoreError, StoreStats};
