//! Read-through result cache.
//!
//! Entries are JSON values with a per-entry TTL. Concurrent misses on one key
//! share a single fetch; the fetch runs on its own task, so callers that
//! give up waiting never cancel it for the others.

mod descriptor;

pub use descriptor::QueryDescriptor;

use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::{CACHE_BYPASSED, CACHE_COALESCED, CACHE_HITS, CACHE_MISSES};

/// Errors raised by the cache itself.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("Invalid clear pattern: {0}")]
    InvalidPattern(String),

    #[error("Shared fetch aborted: {0}")]
    FetchAborted(String),
}

/// A cached value and its freshness bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
    /// Bytes of the serialized value.
    size: usize,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) <= self.ttl
    }
}

/// Cache counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entry_count: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    /// Sum of serialized entry sizes in bytes.
    pub estimated_size: usize,
    pub max_entries: usize,
    /// Fetches currently in flight.
    pub inflight: usize,
}

/// Cache health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    /// False when the cache is at capacity and bypassing inserts.
    pub ok: bool,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry_age_ms: Option<u64>,
}

type SharedFetch<E> = Shared<BoxFuture<'static, Result<Value, E>>>;

/// TTL cache with per-key single-flight fetching.
///
/// `E` is the error type produced by fetches; it is cloned to every caller
/// waiting on the same key.
pub struct CacheLayer<E> {
    entries: RwLock<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, SharedFetch<E>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    max_entries: usize,
}

impl<E> CacheLayer<E>
where
    E: Clone + Send + Sync + From<CacheError> + 'static,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a fresh value. Stale entries are dropped and count as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh(now) => {
                    self.record_hit();
                    debug!(key, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.record_miss();
                    return None;
                }
            }
        }

        // Stale: remove unless someone refreshed it meanwhile
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_fresh(Instant::now()) {
                self.record_hit();
                return Some(entry.value.clone());
            }
            entries.remove(key);
            debug!(key, "Cache entry expired");
        }
        self.record_miss();
        None
    }

    /// Fresh value without touching counters.
    async fn peek(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Store a value. Returns false when the cache is full and the insert
    /// was skipped.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        let size = serde_json::to_vec(&value).map(|v| v.len()).unwrap_or(0);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let now = Instant::now();
            entries.retain(|_, entry| entry.is_fresh(now));
            if entries.len() >= self.max_entries {
                CACHE_BYPASSED.inc();
                warn!(
                    key,
                    max_entries = self.max_entries,
                    "Cache full, skipping insert"
                );
                return false;
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                size,
            },
        );
        true
    }

    /// Return the cached value for `key`, or run `fetch` once for all
    /// concurrent callers and cache its success.
    ///
    /// Failures are returned to every waiter and never cached.
    pub async fn get_or_fetch<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let shared = {
            let mut inflight = self.inflight.lock().await;

            // A fetch may have completed between the miss and taking the lock
            if let Some(value) = self.peek(key).await {
                return Ok(value);
            }

            match inflight.get(key) {
                Some(existing) => {
                    CACHE_COALESCED.inc();
                    debug!(key, "Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let shared = self.spawn_fetch(key.to_string(), ttl, fetch());
                    inflight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    fn spawn_fetch<Fut>(self: &Arc<Self>, key: String, ttl: Duration, fut: Fut) -> SharedFetch<E>
    where
        Fut: Future<Output = Result<Value, E>> + Send + 'static,
    {
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // A panicking fetch still has to release its in-flight slot
            let result = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    warn!(%key, %reason, "Shared fetch panicked");
                    Err(E::from(CacheError::FetchAborted(reason)))
                }
            };
            if let Ok(value) = &result {
                cache.set(&key, value.clone(), ttl).await;
            }
            cache.inflight.lock().await.remove(&key);
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(E::from(CacheError::FetchAborted(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }

    /// Remove entries matching `pattern`, or everything when `None`.
    ///
    /// A pattern containing `*` or `?` is a glob over the whole key;
    /// otherwise it matches as a key prefix. Returns the number removed.
    pub async fn clear(&self, pattern: Option<&str>) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            None => entries.clear(),
            Some(p) if p.contains('*') || p.contains('?') => {
                let re = glob_to_regex(p)?;
                entries.retain(|key, _| !re.is_match(key));
            }
            Some(prefix) => entries.retain(|key, _| !key.starts_with(prefix)),
        }

        let removed = before - entries.len();
        debug!(?pattern, removed, "Cache cleared");
        Ok(removed)
    }

    /// Drop every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let inflight = self.inflight.lock().await.len();
        let entries = self.entries.read().await;
        CacheStats {
            entry_count: entries.len(),
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            estimated_size: entries.values().map(|e| e.size).sum(),
            max_entries: self.max_entries,
            inflight,
        }
    }

    pub async fn health(&self) -> CacheHealth {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let oldest = entries
            .values()
            .map(|e| now.duration_since(e.inserted_at))
            .max();
        CacheHealth {
            ok: entries.len() < self.max_entries,
            entry_count: entries.len(),
            oldest_entry_age_ms: oldest.map(|d| d.as_millis() as u64),
        }
    }

    /// Keys currently stored, fresh or not.
    pub async fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        CACHE_HITS.inc();
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        CACHE_MISSES.inc();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "fetch panicked".to_string()
    }
}

/// Anchored regex for a `*`/`?` glob.
fn glob_to_regex(pattern: &str) -> Result<regex_lite::Regex, CacheError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    re.push('$');
    regex_lite::Regex::new(&re).map_err(|e| CacheError::InvalidPattern(e.to_string()))
}
