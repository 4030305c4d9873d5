//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the animedex server:
//! - HTTP request metrics (latency, counts, in-flight)
//! - Cache and store gauges (collected dynamically)
//! - Core cache, upstream and aggregator counters

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "animedex_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("animedex_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "animedex_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Cache and Store Metrics (collected dynamically)
// =============================================================================

/// Entries held by the cache layer.
pub static CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("animedex_cache_entries", "Number of entries in the cache").unwrap()
});

/// Estimated cache size in bytes.
pub static CACHE_SIZE_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "animedex_cache_size_bytes",
        "Sum of serialized cache entry sizes",
    )
    .unwrap()
});

/// Canonical records in the persistent store.
pub static STORE_RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "animedex_store_records",
        "Number of canonical anime records",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Cache and store
    registry.register(Box::new(CACHE_ENTRIES.clone())).unwrap();
    registry
        .register(Box::new(CACHE_SIZE_BYTES.clone()))
        .unwrap();
    registry.register(Box::new(STORE_RECORDS.clone())).unwrap();

    // Core metrics (cache counters, upstream calls, aggregator operations)
    for metric in animedex_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the cache and store as they are now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let stats = state.cache().stats().await;
    CACHE_ENTRIES.set(stats.entry_count as i64);
    CACHE_SIZE_BYTES.set(stats.estimated_size as i64);

    if let Ok(stats) = state.aggregator().store().stats() {
        STORE_RECORDS.set(stats.total_records as i64);
    }
}

static UUID_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

static NUMERIC_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace ids and free-form segments).
pub fn normalize_path(path: &str) -> String {
    // Genre names are unbounded user input
    if let Some(rest) = path.strip_prefix("/api/v1/genre/") {
        if !rest.is_empty() {
            return "/api/v1/genre/{genre}".to_string();
        }
    }

    let result = UUID_RE.replace_all(path, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/details/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/details/{id}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/details/5114";
        assert_eq!(normalize_path(path), "/api/v1/details/{id}");
    }

    #[test]
    fn test_normalize_path_genre() {
        assert_eq!(
            normalize_path("/api/v1/genre/Slice%20of%20Life"),
            "/api/v1/genre/{genre}"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/cache/stats";
        assert_eq!(normalize_path(path), "/api/v1/cache/stats");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        // Access metrics to ensure they're initialized
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("animedex_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs metrics that have been accessed
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        CACHE_ENTRIES.set(0);
        STORE_RECORDS.set(0);
        animedex_core::metrics::CACHE_HITS.inc_by(0);
        animedex_core::metrics::AGGREGATOR_OPERATIONS
            .with_label_values(&["trending", "ok"])
            .inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("animedex_http_request_duration_seconds"));
        assert!(output.contains("animedex_cache_entries"));
        assert!(output.contains("animedex_store_records"));
        assert!(output.contains("animedex_aggregator_operations_total"));
    }
}
