//! The aggregation service.
//!
//! Every operation builds a [`QueryDescriptor`] and resolves it through the
//! cache. On a miss, providers are probed in priority order until one
//! answers; its payloads are normalized, persisted and cached.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::anime::{AnimeRecord, Provider, RawPayload};
use crate::cache::{CacheLayer, QueryDescriptor};
use crate::config::{AggregatorConfig, CacheConfig};
use crate::metrics::{AGGREGATOR_OPERATIONS, WARMUP_RESULTS};
use crate::normalize::normalize_payload;
use crate::source::{SourceAdapter, SourceError, SourceQuery};
use crate::store::{AnimeStore, StoreError};

use super::types::{AggregatorError, DetailsSource, ProviderFailure, WarmupFailure, WarmupReport};

/// Cache shared by the service and the cache management endpoints.
pub type AnimeCache = CacheLayer<AggregatorError>;

/// Upstream side of the service: adapters plus the store.
///
/// Held behind an `Arc` so cache fetches can own it on a spawned task.
struct Resolver {
    sources: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<dyn AnimeStore>,
    adapter_timeout: Duration,
    popularity_weight: f64,
}

impl Resolver {
    /// Run one adapter call under the configured timeout.
    async fn call<T, F>(&self, fut: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        match tokio::time::timeout(self.adapter_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout),
        }
    }

    /// Normalize a provider's response, skipping malformed records.
    ///
    /// A non-empty response with no usable record counts as that
    /// provider's failure.
    fn normalize_all(
        &self,
        provider: Provider,
        payloads: &[RawPayload],
    ) -> Result<Vec<AnimeRecord>, SourceError> {
        let mut records = Vec::with_capacity(payloads.len());
        let mut last_error = None;
        for payload in payloads {
            match normalize_payload(payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping {} record: {}", provider, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if records.is_empty() => Err(SourceError::upstream(e.to_string())),
            _ => Ok(records),
        }
    }

    /// Upsert records, returning the stored versions.
    ///
    /// Store failures are logged and the normalized record is kept.
    fn persist(&self, records: Vec<AnimeRecord>) -> Vec<AnimeRecord> {
        let mut seen = HashSet::new();
        records
            .into_iter()
            .map(|record| match self.store.upsert(&record) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Failed to persist '{}': {}", record.title, e);
                    record
                }
            })
            .filter(|record| seen.insert(record.id))
            .collect()
    }

    /// Order records by upstream rank pulled up by local access counts.
    fn rerank(&self, records: Vec<AnimeRecord>) -> Vec<AnimeRecord> {
        let mut ranked: Vec<(f64, AnimeRecord)> = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let boost = self.popularity_weight * (record.access_count as f64).ln_1p();
                (index as f64 - boost, record)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.into_iter().map(|(_, record)| record).collect()
    }

    async fn fetch_list(&self, query: SourceQuery) -> Result<Value, AggregatorError> {
        let mut failures = Vec::new();
        for source in &self.sources {
            let provider = source.provider();
            let result = self
                .call(source.fetch(&query))
                .await
                .and_then(|payloads| self.normalize_all(provider, &payloads));

            match result {
                Ok(records) => {
                    let mut records = self.persist(records);
                    if matches!(query, SourceQuery::Trending { .. } | SourceQuery::TopRated { .. }) {
                        records = self.rerank(records);
                    }
                    records.truncate(query.limit() as usize);
                    info!(
                        "Resolved {} from {} ({} records)",
                        query.operation(),
                        provider,
                        records.len()
                    );
                    return encode(&records);
                }
                Err(error) => {
                    warn!("{} failed for {}: {}", provider, query.operation(), error);
                    failures.push(ProviderFailure { provider, error });
                }
            }
        }
        Err(AggregatorError::from_failures(query.operation(), failures))
    }

    /// Provider id space and native id named by a non-UUID details id.
    ///
    /// `kitsu:1` names its provider explicitly. A bare id belongs to the
    /// selected provider, or to the first configured one under `auto`.
    fn native_identity(
        &self,
        id: &str,
        selection: DetailsSource,
    ) -> Result<(Provider, i64), AggregatorError> {
        let (provider, raw) = match id.split_once(':') {
            Some((prefix, rest)) => {
                let provider = prefix.parse::<Provider>().map_err(|_| {
                    AggregatorError::Validation(format!(
                        "Invalid anime id '{}': unknown provider '{}'",
                        id, prefix
                    ))
                })?;
                (provider, rest)
            }
            None => match selection {
                DetailsSource::Only(provider) => (provider, id),
                DetailsSource::Auto => {
                    let first = self
                        .sources
                        .first()
                        .ok_or_else(|| AggregatorError::from_failures("details", Vec::new()))?;
                    (first.provider(), id)
                }
            },
        };
        let native = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| AggregatorError::NotFound(format!("anime {}", id)))?;
        Ok((provider, native))
    }

    /// Every native id known for the title `id` refers to.
    ///
    /// Ids in other providers' spaces come only from stored cross-references,
    /// never from reusing the number as-is.
    fn known_ids(&self, id: &str, selection: DetailsSource) -> Result<Vec<(Provider, i64)>, AggregatorError> {
        if let Ok(canonical) = Uuid::parse_str(id) {
            return match self.store.get(canonical) {
                Ok(record) => Ok(record.provider_ids()),
                Err(StoreError::NotFound(_)) => Err(AggregatorError::NotFound(format!("anime {}", id))),
                Err(e) => Err(AggregatorError::Internal(e.to_string())),
            };
        }

        let (home, native) = self.native_identity(id, selection)?;
        let mut ids = vec![(home, native)];
        match self.store.find_by_provider_id(home, native) {
            Ok(Some(record)) => {
                ids.extend(record.provider_ids().into_iter().filter(|(p, _)| *p != home))
            }
            Ok(None) => {}
            Err(e) => warn!("Cross-reference lookup for {}:{} failed: {}", home, native, e),
        }
        Ok(ids)
    }

    /// Native ids to probe, paired with the adapter that owns each.
    fn details_candidates(
        &self,
        id: &str,
        selection: DetailsSource,
    ) -> Result<Vec<(Arc<dyn SourceAdapter>, String)>, AggregatorError> {
        let ids = self.known_ids(id, selection)?;
        let candidates: Vec<_> = self
            .sources
            .iter()
            .filter(|source| selection.allows(source.provider()))
            .filter_map(|source| {
                ids.iter()
                    .find(|(provider, _)| *provider == source.provider())
                    .map(|(_, native)| (Arc::clone(source), native.to_string()))
            })
            .collect();
        if candidates.is_empty() {
            return Err(AggregatorError::NotFound(format!(
                "anime {} has no {} id",
                id,
                selection.as_str()
            )));
        }
        Ok(candidates)
    }

    async fn fetch_details(&self, id: String, selection: DetailsSource) -> Result<Value, AggregatorError> {
        let candidates = self.details_candidates(&id, selection)?;

        let mut failures = Vec::new();
        for (source, native_id) in candidates {
            let provider = source.provider();
            let result = self
                .call(source.fetch_details(&native_id))
                .await
                .and_then(|payload| self.normalize_all(provider, std::slice::from_ref(&payload)));

            match result {
                Ok(records) => {
                    if let Some(record) = self.persist(records).into_iter().next() {
                        info!("Resolved details {} from {} as {}", id, provider, record.id);
                        return encode(&record);
                    }
                }
                Err(error) => {
                    debug!("{} details {} failed: {}", provider, native_id, error);
                    failures.push(ProviderFailure { provider, error });
                }
            }
        }
        Err(AggregatorError::from_failures("details", failures))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, AggregatorError> {
    serde_json::to_value(value).map_err(|e| AggregatorError::Internal(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AggregatorError> {
    serde_json::from_value(value).map_err(|e| AggregatorError::Internal(e.to_string()))
}

fn record_outcome<T>(operation: &str, result: &Result<T, AggregatorError>) {
    let label = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    AGGREGATOR_OPERATIONS
        .with_label_values(&[operation, label])
        .inc();
}

/// Browse, search and details operations over all providers.
pub struct AnimeAggregator {
    resolver: Arc<Resolver>,
    cache: Arc<AnimeCache>,
    config: AggregatorConfig,
    cache_config: CacheConfig,
}

impl AnimeAggregator {
    /// Create a service over `sources`, probed in the given order.
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn AnimeStore>,
        cache: Arc<AnimeCache>,
        config: AggregatorConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            resolver: Arc::new(Resolver {
                sources,
                store,
                adapter_timeout: Duration::from_secs(config.adapter_timeout_secs),
                popularity_weight: config.popularity_weight,
            }),
            cache,
            config,
            cache_config,
        }
    }

    pub fn cache(&self) -> &Arc<AnimeCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn AnimeStore> {
        &self.resolver.store
    }

    /// Configured providers in probe order.
    pub fn providers(&self) -> Vec<Provider> {
        self.resolver.sources.iter().map(|s| s.provider()).collect()
    }

    /// Apply the default and clamp into `[1, max_limit]`.
    pub fn effective_limit(&self, limit: Option<u32>) -> u32 {
        limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1))
    }

    pub async fn get_trending(&self, limit: Option<u32>) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let limit = self.effective_limit(limit);
        self.list(QueryDescriptor::Trending { limit }).await
    }

    pub async fn get_top_rated(&self, limit: Option<u32>) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let limit = self.effective_limit(limit);
        self.list(QueryDescriptor::TopRated { limit }).await
    }

    pub async fn get_new_arrivals(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let limit = self.effective_limit(limit);
        self.list(QueryDescriptor::NewArrivals { limit }).await
    }

    pub async fn get_by_genre(
        &self,
        genre: &str,
        limit: Option<u32>,
    ) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let genre = genre.trim();
        if genre.is_empty() {
            return self.reject("genre", "Genre is required");
        }
        let limit = self.effective_limit(limit);
        self.list(QueryDescriptor::Genre {
            genre: genre.to_string(),
            limit,
        })
        .await
    }

    /// Free-text search. A blank query is rejected before any provider call.
    pub async fn search(&self, query: &str, limit: Option<u32>) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let query = query.trim();
        if query.is_empty() {
            return self.reject("search", "Search query is required");
        }
        let limit = self.effective_limit(limit);
        self.list(QueryDescriptor::Search {
            query: query.to_string(),
            limit,
        })
        .await
    }

    /// Resolve one title by canonical UUID or provider-native id.
    ///
    /// Native ids may be namespaced (`kitsu:1`); a bare one belongs to the
    /// selected provider, or the first configured one under `auto`.
    /// `source` is `auto` (every provider in order) or a provider name.
    /// Cache hits still count as an access on the stored record.
    pub async fn get_details(&self, id: &str, source: &str) -> Result<AnimeRecord, AggregatorError> {
        let result = self.details(id, source).await;
        record_outcome("details", &result);
        result
    }

    async fn details(&self, id: &str, source: &str) -> Result<AnimeRecord, AggregatorError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AggregatorError::Validation("Anime id is required".to_string()));
        }
        let selection: DetailsSource = source.parse()?;
        if let DetailsSource::Only(provider) = selection {
            if !self.providers().contains(&provider) {
                return Err(AggregatorError::Validation(format!(
                    "Source '{}' is not configured",
                    provider
                )));
            }
        }

        let descriptor = QueryDescriptor::Details {
            id: id.to_string(),
            source: selection.as_str().to_string(),
        };
        let resolver = Arc::clone(&self.resolver);
        let owned_id = id.to_string();
        let mut fetched = false;
        let value = self
            .cache
            .get_or_fetch(&descriptor.key(), descriptor.ttl(&self.cache_config), || {
                fetched = true;
                async move { resolver.fetch_details(owned_id, selection).await }
            })
            .await?;
        let record: AnimeRecord = decode(value)?;

        if fetched {
            return Ok(record);
        }
        match self.resolver.store.touch(record.id) {
            Ok(touched) => Ok(touched),
            Err(e) => {
                warn!("Failed to record access for {}: {}", record.id, e);
                Ok(record)
            }
        }
    }

    async fn list(&self, descriptor: QueryDescriptor) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let result = self.resolve_list(&descriptor).await;
        record_outcome(descriptor.kind(), &result);
        result
    }

    async fn resolve_list(&self, descriptor: &QueryDescriptor) -> Result<Vec<AnimeRecord>, AggregatorError> {
        let query = descriptor
            .source_query()
            .ok_or_else(|| AggregatorError::Internal(format!("{} is not a list query", descriptor)))?;
        let resolver = Arc::clone(&self.resolver);
        let value = self
            .cache
            .get_or_fetch(&descriptor.key(), descriptor.ttl(&self.cache_config), move || async move {
                resolver.fetch_list(query).await
            })
            .await?;
        decode(value)
    }

    fn reject<T>(&self, operation: &str, message: &str) -> Result<T, AggregatorError> {
        let result = Err(AggregatorError::Validation(message.to_string()));
        record_outcome(operation, &result);
        result
    }

    /// Populate the default-limit trending, top-rated and new-arrival lists.
    ///
    /// Each descriptor is attempted regardless of earlier failures.
    pub async fn warm_up(&self) -> WarmupReport {
        let limit = self.config.default_limit;
        let descriptors = [
            QueryDescriptor::Trending { limit },
            QueryDescriptor::TopRated { limit },
            QueryDescriptor::NewArrivals { limit },
        ];

        let mut report = WarmupReport::default();
        for descriptor in descriptors {
            let key = descriptor.key();
            match self.list(descriptor).await {
                Ok(records) => {
                    debug!("Warmed {} ({} records)", key, records.len());
                    WARMUP_RESULTS.with_label_values(&["warmed"]).inc();
                    report.warmed.push(key);
                }
                Err(e) => {
                    warn!("Warm-up of {} failed: {}", key, e);
                    WARMUP_RESULTS.with_label_values(&["failed"]).inc();
                    report.failed.push(WarmupFailure {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            "Cache warm-up finished: {} warmed, {} failed",
            report.warmed.len(),
            report.failed.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteAnimeStore;
    use crate::testing::{fixtures, MockSource};

    struct Harness {
        aggregator: AnimeAggregator,
        jikan: MockSource,
        anilist: MockSource,
        store: Arc<SqliteAnimeStore>,
    }

    fn harness() -> Harness {
        let jikan = MockSource::new(Provider::Jikan);
        let anilist = MockSource::new(Provider::AniList);
        let store = Arc::new(SqliteAnimeStore::in_memory().unwrap());
        let aggregator = AnimeAggregator::new(
            vec![Arc::new(jikan.clone()), Arc::new(anilist.clone())],
            store.clone(),
            Arc::new(AnimeCache::new(100)),
            AggregatorConfig {
                adapter_timeout_secs: 1,
                ..AggregatorConfig::default()
            },
            CacheConfig::default(),
        );
        Harness {
            aggregator,
            jikan,
            anilist,
            store,
        }
    }

    #[tokio::test]
    async fn test_limit_default_and_clamp() {
        let h = harness();
        assert_eq!(h.aggregator.effective_limit(None), 12);
        assert_eq!(h.aggregator.effective_limit(Some(0)), 1);
        assert_eq!(h.aggregator.effective_limit(Some(500)), 50);
        assert_eq!(h.aggregator.effective_limit(Some(7)), 7);
    }

    #[tokio::test]
    async fn test_first_provider_wins() {
        let h = harness();
        h.jikan.set_payloads(fixtures::jikan_list(5)).await;
        h.anilist.set_payloads(fixtures::anilist_list(5)).await;

        let records = h.aggregator.get_new_arrivals(Some(5)).await.unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.source == Provider::Jikan));
        assert_eq!(h.anilist.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_provider() {
        let h = harness();
        h.jikan.fail_with(SourceError::RateLimited).await;
        h.anilist.set_payloads(fixtures::anilist_list(3)).await;

        let records = h.aggregator.get_top_rated(Some(3)).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.source == Provider::AniList));
        assert_eq!(h.jikan.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_response_counts_as_failure() {
        let h = harness();
        h.jikan
            .set_payloads(vec![
                fixtures::malformed(Provider::Jikan),
                fixtures::malformed(Provider::Jikan),
            ])
            .await;
        h.anilist.set_payloads(fixtures::anilist_list(2)).await;

        let records = h.aggregator.get_new_arrivals(Some(2)).await.unwrap();
        assert!(records.iter().all(|r| r.source == Provider::AniList));
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let h = harness();
        let mut payloads = fixtures::jikan_list(2);
        payloads.insert(1, fixtures::malformed(Provider::Jikan));
        h.jikan.set_payloads(payloads).await;

        let records = h.aggregator.get_new_arrivals(Some(3)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(h.anilist.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_records_are_persisted() {
        let h = harness();
        h.jikan.set_payloads(fixtures::jikan_list(3)).await;

        let records = h.aggregator.get_trending(Some(3)).await.unwrap();
        let stats = h.store.stats().unwrap();
        assert_eq!(stats.total_records, 3);
        for record in records {
            assert_eq!(record.access_count, 1);
            assert!(h.store.get(record.id).is_ok());
        }
    }

    #[tokio::test]
    async fn test_access_counts_rerank_trending() {
        let h = harness();
        h.jikan.set_payloads(fixtures::jikan_list(3)).await;

        // Make the last upstream entry locally popular
        let popular = normalize_payload(&fixtures::jikan_anime(3, "Jikan Anime 3")).unwrap();
        for _ in 0..20 {
            h.store.upsert(&popular).unwrap();
        }

        let records = h.aggregator.get_trending(Some(3)).await.unwrap();
        assert_eq!(records[0].mal_id, Some(3));
        assert_eq!(records[1].mal_id, Some(1));
        assert_eq!(records[2].mal_id, Some(2));
    }

    #[tokio::test]
    async fn test_search_rejects_blank_query() {
        let h = harness();
        let err = h.aggregator.search("   ", None).await.unwrap_err();
        assert!(matches!(err, AggregatorError::Validation(_)));
        assert_eq!(h.jikan.call_count().await, 0);
        assert_eq!(h.anilist.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_genre_everywhere_is_not_found() {
        let h = harness();
        h.jikan
            .fail_operation("genre", SourceError::NotFound("genre 'isekai'".to_string()))
            .await;
        h.anilist
            .fail_operation("genre", SourceError::NotFound("genre 'isekai'".to_string()))
            .await;

        let err = h.aggregator.get_by_genre("isekai", None).await.unwrap_err();
        assert!(matches!(err, AggregatorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_details_namespaced_id() {
        let h = harness();
        h.anilist
            .add_details("5114", fixtures::anilist_media(5114, Some(5114), "Fullmetal Alchemist"))
            .await;

        let record = h.aggregator.get_details("anilist:5114", "auto").await.unwrap();
        assert_eq!(record.title, "Fullmetal Alchemist");
        assert_eq!(record.anilist_id, Some(5114));
        assert_eq!(h.jikan.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_details_bare_id_stays_in_first_provider_space() {
        let h = harness();
        h.jikan.fail_with(SourceError::Timeout).await;
        h.anilist
            .add_details("1", fixtures::anilist_media(1, None, "Unrelated Title"))
            .await;

        let err = h.aggregator.get_details("1", "auto").await.unwrap_err();
        assert!(matches!(err, AggregatorError::UpstreamUnavailable { .. }));
        assert_eq!(h.anilist.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_details_falls_back_through_stored_cross_reference() {
        let h = harness();
        h.anilist
            .add_details("5114", fixtures::anilist_media(5114, Some(5114), "Fullmetal Alchemist"))
            .await;
        let linked = h.aggregator.get_details("anilist:5114", "auto").await.unwrap();

        // MAL 5114 is known to be AniList 5114, so a Jikan outage falls through
        h.jikan.fail_with(SourceError::Timeout).await;
        let record = h.aggregator.get_details("5114", "auto").await.unwrap();
        assert_eq!(record.id, linked.id);
        assert_eq!(h.jikan.call_count().await, 1);
        assert_eq!(h.anilist.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_details_rejects_unknown_prefix_and_non_numeric_ids() {
        let h = harness();
        let err = h.aggregator.get_details("netflix:1", "auto").await.unwrap_err();
        assert!(matches!(err, AggregatorError::Validation(_)));

        let err = h.aggregator.get_details("bebop", "auto").await.unwrap_err();
        assert!(matches!(err, AggregatorError::NotFound(_)));
        assert_eq!(h.jikan.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_details_by_canonical_id() {
        let h = harness();
        h.jikan.add_details("1", fixtures::jikan_anime(1, "Cowboy Bebop")).await;
        let first = h.aggregator.get_details("1", "jikan").await.unwrap();

        let by_uuid = h
            .aggregator
            .get_details(&first.id.to_string(), "auto")
            .await
            .unwrap();
        assert_eq!(by_uuid.id, first.id);
        assert_eq!(by_uuid.access_count, 2);
        assert_eq!(h.anilist.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_details_unknown_canonical_id() {
        let h = harness();
        let err = h
            .aggregator
            .get_details(&Uuid::new_v4().to_string(), "auto")
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::NotFound(_)));
        assert_eq!(h.jikan.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_details_source_validation() {
        let h = harness();
        let err = h.aggregator.get_details("1", "netflix").await.unwrap_err();
        assert!(matches!(err, AggregatorError::Validation(_)));

        let err = h.aggregator.get_details("1", "kitsu").await.unwrap_err();
        assert_eq!(
            err,
            AggregatorError::Validation("Source 'kitsu' is not configured".to_string())
        );
    }

    #[tokio::test]
    async fn test_details_cache_hit_touches_record() {
        let h = harness();
        h.jikan.add_details("1", fixtures::jikan_anime(1, "Cowboy Bebop")).await;

        let first = h.aggregator.get_details("1", "auto").await.unwrap();
        let second = h.aggregator.get_details("1", "auto").await.unwrap();
        assert_eq!(h.jikan.call_count().await, 1);
        assert_eq!(second.access_count, first.access_count + 1);
        assert!(second.last_accessed > first.last_accessed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_adapter_times_out() {
        let h = harness();
        h.jikan.set_delay(Duration::from_secs(5)).await;
        h.anilist.set_delay(Duration::from_secs(5)).await;

        let err = h.aggregator.get_details("1", "auto").await.unwrap_err();
        match err {
            AggregatorError::UpstreamUnavailable { failures, .. } => {
                // A bare id is only tried in the first provider's id space
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].provider, Provider::Jikan);
                assert_eq!(failures[0].error, SourceError::Timeout);
            }
            other => panic!("expected UpstreamUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overflowing_duration_does_not_wedge_the_key() {
        let h = harness();
        h.jikan
            .set_payloads(vec![RawPayload::new(
                Provider::Jikan,
                serde_json::json!({ "mal_id": 7, "title": "X", "duration": "99999999 hr" }),
            )])
            .await;

        let records = h.aggregator.get_trending(Some(1)).await.unwrap();
        assert_eq!(records[0].mal_id, Some(7));
        assert_eq!(records[0].duration, None);
        assert_eq!(h.aggregator.cache().stats().await.inflight, 0);
    }

    #[tokio::test]
    async fn test_warm_up_partial_failure() {
        let h = harness();
        h.jikan.set_payloads(fixtures::jikan_list(12)).await;
        h.jikan.fail_operation("top_rated", SourceError::Timeout).await;
        h.anilist.fail_operation("top_rated", SourceError::Timeout).await;

        let report = h.aggregator.warm_up().await;
        assert_eq!(report.warmed, vec!["trending:12", "new_arrivals:12"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "top_rated:12");
        assert_eq!(
            h.aggregator.cache().keys().await,
            vec!["new_arrivals:12", "trending:12"]
        );
    }
}
