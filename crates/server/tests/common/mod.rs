//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the in-process router
//! with mock providers injected, so the full HTTP surface can be exercised
//! without reaching real anime APIs.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use animedex_core::{
    testing::MockSource, AggregatorConfig, AnimeAggregator, AnimeCache, CacheConfig, Config,
    DatabaseConfig, Provider, ServerConfig, SourceAdapter, SqliteAnimeStore,
};

/// Re-export fixtures for test convenience
pub use animedex_core::testing::fixtures;

/// Test fixture for API testing with mock providers.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_trending() {
///     let fixture = TestFixture::new().await;
///     fixture.jikan.set_payloads(fixtures::jikan_list(12)).await;
///
///     let response = fixture.get("/api/v1/trending").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock providers, probed in this order
    pub jikan: MockSource,
    pub anilist: MockSource,
    pub kitsu: MockSource,
    /// Cache shared with the aggregator
    pub cache: Arc<AnimeCache>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let jikan = MockSource::new(Provider::Jikan);
        let anilist = MockSource::new(Provider::AniList);
        let kitsu = MockSource::new(Provider::Kitsu);

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            cache: CacheConfig {
                max_entries: test_config.max_entries,
                warmup_on_start: false,
                ..Default::default()
            },
            aggregator: AggregatorConfig {
                adapter_timeout_secs: test_config.adapter_timeout_secs,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(SqliteAnimeStore::new(&db_path).expect("Failed to create store"));
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(jikan.clone()),
            Arc::new(anilist.clone()),
            Arc::new(kitsu.clone()),
        ];
        let cache = Arc::new(AnimeCache::new(config.cache.max_entries));
        let aggregator = Arc::new(AnimeAggregator::new(
            sources,
            store,
            Arc::clone(&cache),
            config.aggregator.clone(),
            config.cache.clone(),
        ));

        let state = Arc::new(animedex_server::state::AppState::new(config, aggregator));
        let router = animedex_server::api::create_router(state);

        Self {
            router,
            jikan,
            anilist,
            kitsu,
            cache,
            temp_dir,
        }
    }

    /// Total calls made to every mock provider.
    pub async fn upstream_calls(&self) -> usize {
        self.jikan.call_count().await + self.anilist.call_count().await + self.kitsu.call_count().await
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub max_entries: usize,
    pub adapter_timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            adapter_timeout_secs: 2,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
