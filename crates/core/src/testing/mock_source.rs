//! Mock source adapter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::anime::{Provider, RawPayload};
use crate::source::{SourceAdapter, SourceError, SourceQuery};

/// What a [`MockSource`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceCall {
    Fetch(SourceQuery),
    Details(String),
}

/// A recorded adapter call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: SourceCall,
    pub timestamp: Instant,
}

/// Mock implementation of the SourceAdapter trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable list and details payloads
/// - Track every call for assertions
/// - Simulate failures (one-shot, per operation, or permanent) and delays
///
/// # Example
///
/// ```rust,ignore
/// use animedex_core::testing::{fixtures, MockSource};
///
/// let source = MockSource::new(Provider::Jikan);
/// source.set_payloads(fixtures::jikan_list(12)).await;
///
/// let payloads = source.fetch(&SourceQuery::Trending { limit: 12 }).await?;
/// assert_eq!(payloads.len(), 12);
/// assert_eq!(source.call_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockSource {
    provider: Provider,
    /// Payloads returned by list queries (truncated to the query limit).
    payloads: Arc<RwLock<Vec<RawPayload>>>,
    /// Payloads returned by details lookups, keyed by native id.
    details: Arc<RwLock<HashMap<String, RawPayload>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<SourceError>>>,
    /// If set, every call fails with this error.
    failure: Arc<RwLock<Option<SourceError>>>,
    /// Errors for specific list operations (e.g. "top_rated").
    operation_errors: Arc<RwLock<HashMap<&'static str, SourceError>>>,
    /// Artificial latency applied to every call.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockSource {
    /// Create a new mock source with no payloads.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            payloads: Arc::new(RwLock::new(Vec::new())),
            details: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failure: Arc::new(RwLock::new(None)),
            operation_errors: Arc::new(RwLock::new(HashMap::new())),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the payloads returned by list queries.
    pub async fn set_payloads(&self, payloads: Vec<RawPayload>) {
        *self.payloads.write().await = payloads;
    }

    /// Register a details payload for a native id.
    pub async fn add_details(&self, native_id: &str, payload: RawPayload) {
        self.details
            .write()
            .await
            .insert(native_id.to_string(), payload);
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: SourceError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every call fail with the given error until cleared.
    pub async fn fail_with(&self, error: SourceError) {
        *self.failure.write().await = Some(error);
    }

    /// Stop failing.
    pub async fn clear_failure(&self) {
        *self.failure.write().await = None;
        *self.next_error.write().await = None;
    }

    /// Make one list operation fail, e.g. `"top_rated"`.
    pub async fn fail_operation(&self, operation: &'static str, error: SourceError) {
        self.operation_errors.write().await.insert(operation, error);
    }

    /// Add latency to every call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Get recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Get the number of calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Clear recorded calls.
    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    /// Record a call, wait out the delay, and return any injected error.
    async fn begin(&self, call: SourceCall) -> Result<(), SourceError> {
        let operation = match &call {
            SourceCall::Fetch(query) => Some(query.operation()),
            SourceCall::Details(_) => None,
        };
        self.calls.write().await.push(RecordedCall {
            call,
            timestamp: Instant::now(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if let Some(err) = self.failure.read().await.clone() {
            return Err(err);
        }
        if let Some(operation) = operation {
            if let Some(err) = self.operation_errors.read().await.get(operation) {
                return Err(err.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawPayload>, SourceError> {
        self.begin(SourceCall::Fetch(query.clone())).await?;
        let payloads = self.payloads.read().await;
        Ok(payloads
            .iter()
            .take(query.limit() as usize)
            .cloned()
            .collect())
    }

    async fn fetch_details(&self, native_id: &str) -> Result<RawPayload, SourceError> {
        self.begin(SourceCall::Details(native_id.to_string())).await?;
        self.details
            .read()
            .await
            .get(native_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(native_id.to_string()))
    }
}
