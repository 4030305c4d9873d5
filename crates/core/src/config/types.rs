use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::anime::Provider;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("animedex.db")
}

/// Cache layer configuration.
///
/// TTLs are per descriptor kind. Browse lists churn faster than details.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL for trending lists (seconds).
    #[serde(default = "default_list_ttl")]
    pub trending_ttl_secs: u64,
    /// TTL for top-rated lists (seconds).
    #[serde(default = "default_slow_list_ttl")]
    pub top_rated_ttl_secs: u64,
    /// TTL for new-arrival lists (seconds).
    #[serde(default = "default_list_ttl")]
    pub new_arrivals_ttl_secs: u64,
    /// TTL for genre lists (seconds).
    #[serde(default = "default_slow_list_ttl")]
    pub genre_ttl_secs: u64,
    /// TTL for search results (seconds).
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,
    /// TTL for single-title details (seconds).
    #[serde(default = "default_details_ttl")]
    pub details_ttl_secs: u64,
    /// Maximum number of entries held at once.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Populate the hot descriptors when the server starts.
    #[serde(default = "default_true")]
    pub warmup_on_start: bool,
    /// Interval of the background expired-entry sweep (seconds, 0 disables it).
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            trending_ttl_secs: default_list_ttl(),
            top_rated_ttl_secs: default_slow_list_ttl(),
            new_arrivals_ttl_secs: default_list_ttl(),
            genre_ttl_secs: default_slow_list_ttl(),
            search_ttl_secs: default_search_ttl(),
            details_ttl_secs: default_details_ttl(),
            max_entries: default_max_entries(),
            warmup_on_start: default_true(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_list_ttl() -> u64 {
    600
}

fn default_slow_list_ttl() -> u64 {
    3600
}

fn default_search_ttl() -> u64 {
    300
}

fn default_details_ttl() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    10_000
}

fn default_purge_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Aggregation service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Limit used when a caller does not pass one.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Upper bound for any requested limit.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    /// Hard timeout around each adapter call (seconds).
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,
    /// How strongly access counts pull titles up in trending/top-rated lists.
    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            adapter_timeout_secs: default_adapter_timeout(),
            popularity_weight: default_popularity_weight(),
        }
    }
}

fn default_limit() -> u32 {
    12
}

fn default_max_limit() -> u32 {
    50
}

fn default_adapter_timeout() -> u64 {
    15
}

fn default_popularity_weight() -> f64 {
    2.0
}

/// Upstream provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// Probe order for `source=auto` and browse fallbacks.
    #[serde(default = "default_order")]
    pub order: Vec<String>,
    #[serde(default = "ProviderConfig::jikan")]
    pub jikan: ProviderConfig,
    #[serde(default = "ProviderConfig::anilist")]
    pub anilist: ProviderConfig,
    #[serde(default = "ProviderConfig::kitsu")]
    pub kitsu: ProviderConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            jikan: ProviderConfig::jikan(),
            anilist: ProviderConfig::anilist(),
            kitsu: ProviderConfig::kitsu(),
        }
    }
}

impl SourcesConfig {
    /// Configuration for one provider.
    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Jikan => &self.jikan,
            Provider::AniList => &self.anilist,
            Provider::Kitsu => &self.kitsu,
        }
    }

    /// Enabled providers in probe order. Unknown names are skipped.
    pub fn ordered_providers(&self) -> Vec<Provider> {
        self.order
            .iter()
            .filter_map(|name| name.parse::<Provider>().ok())
            .filter(|p| self.provider(*p).enabled)
            .collect()
    }
}

fn default_order() -> Vec<String> {
    vec![
        "jikan".to_string(),
        "anilist".to_string(),
        "kitsu".to_string(),
    ]
}

/// Per-provider client settings.
///
/// Attempts and delay are explicit: nothing is inherited from HTTP client defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override for the provider's API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Requests per minute allowed by the provider.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rpm: u32,
    /// Per-request HTTP timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Total attempts per call, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts (milliseconds).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl ProviderConfig {
    fn with_rate(rate_limit_rpm: u32) -> Self {
        Self {
            enabled: true,
            base_url: None,
            rate_limit_rpm,
            timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }

    /// Jikan allows 60 requests per minute (and 3 per second).
    pub fn jikan() -> Self {
        Self::with_rate(55)
    }

    /// AniList allows 90 requests per minute.
    pub fn anilist() -> Self {
        Self::with_rate(85)
    }

    /// Kitsu has no published limit; stay polite.
    pub fn kitsu() -> Self {
        Self::with_rate(60)
    }
}

fn default_rate_limit() -> u32 {
    60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub aggregator: AggregatorConfig,
    pub sources: SanitizedSourcesConfig,
}

/// Sources as exposed over the API: only which providers are active and in what order.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourcesConfig {
    pub order: Vec<String>,
    pub enabled: Vec<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            cache: config.cache.clone(),
            aggregator: config.aggregator.clone(),
            sources: SanitizedSourcesConfig {
                order: config.sources.order.clone(),
                enabled: config
                    .sources
                    .ordered_providers()
                    .into_iter()
                    .map(|p| p.as_str().to_string())
                    .collect(),
            },
        }
    }
}
