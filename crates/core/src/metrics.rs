//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Cache layer (hits, misses, coalesced fetches, bypassed inserts)
//! - Upstream providers (requests, retries, latency)
//! - Aggregation (operations by result, warm-up outcomes)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Cache Metrics
// =============================================================================

/// Cache lookups that returned a fresh entry.
pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("animedex_cache_hits_total", "Total cache hits").unwrap()
});

/// Cache lookups that found nothing or a stale entry.
pub static CACHE_MISSES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("animedex_cache_misses_total", "Total cache misses").unwrap()
});

/// Callers that joined an in-flight fetch instead of starting one.
pub static CACHE_COALESCED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "animedex_cache_coalesced_total",
        "Total callers served by an already in-flight fetch",
    )
    .unwrap()
});

/// Inserts skipped because the cache was full.
pub static CACHE_BYPASSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "animedex_cache_bypassed_total",
        "Total cache inserts skipped at capacity",
    )
    .unwrap()
});

// =============================================================================
// Upstream Metrics
// =============================================================================

/// Upstream requests by provider and result.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "animedex_upstream_requests_total",
            "Total upstream provider requests",
        ),
        &["provider", "result"], // "success", "not_found", "rate_limited", "timeout", "error"
    )
    .unwrap()
});

/// Upstream request duration in seconds.
pub static UPSTREAM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "animedex_upstream_duration_seconds",
            "Duration of upstream provider requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["provider"],
    )
    .unwrap()
});

/// Retries issued against upstream providers.
pub static UPSTREAM_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "animedex_upstream_retries_total",
            "Total upstream request retries",
        ),
        &["provider"],
    )
    .unwrap()
});

// =============================================================================
// Aggregation Metrics
// =============================================================================

/// Aggregation operations by operation and result.
pub static AGGREGATOR_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "animedex_aggregator_operations_total",
            "Total aggregation operations",
        ),
        &["operation", "result"], // result: "ok", "invalid", "not_found", "unavailable", "internal"
    )
    .unwrap()
});

/// Warm-up descriptors by outcome.
pub static WARMUP_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("animedex_warmup_results_total", "Cache warm-up outcomes"),
        &["result"], // "warmed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Cache
        Box::new(CACHE_HITS.clone()),
        Box::new(CACHE_MISSES.clone()),
        Box::new(CACHE_COALESCED.clone()),
        Box::new(CACHE_BYPASSED.clone()),
        // Upstream
        Box::new(UPSTREAM_REQUESTS.clone()),
        Box::new(UPSTREAM_DURATION.clone()),
        Box::new(UPSTREAM_RETRIES.clone()),
        // Aggregation
        Box::new(AGGREGATOR_OPERATIONS.clone()),
        Box::new(WARMUP_RESULTS.clone()),
    ]
}
