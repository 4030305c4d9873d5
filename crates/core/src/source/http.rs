//! HTTP plumbing shared by the provider adapters.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use super::SourceError;
use crate::anime::Provider;
use crate::config::ProviderConfig;
use crate::metrics::{UPSTREAM_DURATION, UPSTREAM_REQUESTS, UPSTREAM_RETRIES};

/// Bounded retry behavior for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Rate-limited, retrying JSON client for one provider.
pub struct SourceHttp {
    provider: Provider,
    client: Client,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl SourceHttp {
    pub fn new(provider: Provider, config: &ProviderConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("animedex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            provider,
            client,
            limiter: RateLimiter::new(config.rate_limit_rpm),
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET a JSON document.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        self.execute(|| self.client.get(url).query(query)).await
    }

    /// POST a JSON body and parse the JSON response.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, SourceError> {
        self.execute(|| self.client.post(url).json(body)).await
    }

    /// Send a request built by `build`, retrying retryable failures.
    async fn execute<F>(&self, build: F) -> Result<Value, SourceError>
    where
        F: Fn() -> RequestBuilder,
    {
        let provider = self.provider.as_str();
        let mut attempt = 1;

        loop {
            self.limiter.acquire().await;

            let started = Instant::now();
            let result = match build().send().await {
                Ok(response) => classify(response).await,
                Err(e) => Err(SourceError::from(e)),
            };
            UPSTREAM_DURATION
                .with_label_values(&[provider])
                .observe(started.elapsed().as_secs_f64());

            match result {
                Ok(body) => {
                    UPSTREAM_REQUESTS
                        .with_label_values(&[provider, "success"])
                        .inc();
                    debug!(provider, attempt, "Upstream request succeeded");
                    return Ok(body);
                }
                Err(e) => {
                    UPSTREAM_REQUESTS
                        .with_label_values(&[provider, e.kind()])
                        .inc();

                    if !e.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(e);
                    }

                    warn!(
                        provider,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Upstream request failed, retrying"
                    );
                    UPSTREAM_RETRIES.with_label_values(&[provider]).inc();
                    tokio::time::sleep(self.retry.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Map a response to a JSON body or a classified error.
async fn classify(response: Response) -> Result<Value, SourceError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(response.url().path().to_string()));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SourceError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Upstream {
            status: Some(status.as_u16()),
            message: truncate(&body, 200),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| match SourceError::from(e) {
            SourceError::Timeout => SourceError::Timeout,
            other => SourceError::upstream(format!("Failed to parse response: {}", other)),
        })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
