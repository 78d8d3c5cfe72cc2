//! Response Cache Service
//!
//! Wraps a read-only handler with a TTL cache. Keys come from
//! [`CacheKeyPolicy`]; a response is stored only when it is a 200 whose JSON
//! body does not report `"success": false`.
//!
//! Concurrent misses on the same key each run the handler and each store
//! their result. The last write wins.

use std::future::Future;
use std::time::Duration;

use rollcall_core::SharedClock;
use rollcall_storage::{
    CacheKeyPolicy, CachePolicy, CacheStats, CacheStore, CacheStoreConfig, KeyPattern,
    RequestDescriptor,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::Sweepable;
use crate::telemetry::metrics;

/// A handler result as held by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Value,
}

impl CachedResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// 200 with a body that does not declare itself unsuccessful.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.body.get("success") != Some(&Value::Bool(false))
    }
}

/// How a request was served, reported in the `x-cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

/// First half of [`ResponseCache::handle`], split out for the middleware,
/// which has to run the handler itself.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Caching does not apply; run the handler and store nothing.
    Bypass,
    Hit(CachedResponse),
    /// Run the handler, then hand the result to [`ResponseCache::store`].
    Miss { key: String, ttl: Duration },
}

impl CacheLookup {
    pub fn status(&self) -> CacheStatus {
        match self {
            CacheLookup::Bypass => CacheStatus::Bypass,
            CacheLookup::Hit(_) => CacheStatus::Hit,
            CacheLookup::Miss { .. } => CacheStatus::Miss,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheOutcome {
    pub response: CachedResponse,
    pub status: CacheStatus,
}

pub struct ResponseCache {
    store: CacheStore<CachedResponse>,
    keys: CacheKeyPolicy,
}

impl ResponseCache {
    pub fn new(config: CacheStoreConfig, clock: SharedClock) -> Self {
        Self::with_key_policy(config, CacheKeyPolicy::default(), clock)
    }

    pub fn with_key_policy(config: CacheStoreConfig, keys: CacheKeyPolicy, clock: SharedClock) -> Self {
        Self {
            store: CacheStore::new(config, clock),
            keys,
        }
    }

    pub fn config(&self) -> &CacheStoreConfig {
        self.store.config()
    }

    /// Key `request` would be stored under.
    pub fn key_for(&self, request: &RequestDescriptor, policy: &CachePolicy) -> String {
        self.keys.derive(request, policy)
    }

    pub fn lookup(&self, request: &RequestDescriptor, policy: &CachePolicy) -> CacheLookup {
        let lookup = if !policy.applies_to(request) {
            tracing::trace!(method = %request.method, path = %request.path, "Cache bypass");
            CacheLookup::Bypass
        } else {
            let key = self.keys.derive(request, policy);
            match self.store.get(&key) {
                Some(response) => {
                    tracing::debug!(key = %key, "Cache hit");
                    CacheLookup::Hit(response)
                }
                None => {
                    tracing::debug!(key = %key, "Cache miss");
                    let ttl = policy.ttl.unwrap_or(self.store.config().default_ttl);
                    CacheLookup::Miss { key, ttl }
                }
            }
        };

        if let Some(m) = metrics() {
            m.record_cache_lookup(lookup.status().metric_label());
        }
        lookup
    }

    /// Store `response` under `key` if it is cacheable. Returns whether it
    /// was stored.
    pub fn store(&self, key: &str, ttl: Duration, response: &CachedResponse) -> bool {
        if !response.is_cacheable() {
            tracing::debug!(key, status = response.status, "Response not cacheable");
            return false;
        }
        self.store.set_with_ttl(key, response.clone(), ttl);
        tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cached response");
        true
    }

    /// Serve `request` from the cache or by running `compute`.
    pub async fn handle<F, Fut>(
        &self,
        request: &RequestDescriptor,
        policy: &CachePolicy,
        compute: F,
    ) -> CacheOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CachedResponse>,
    {
        match self.lookup(request, policy) {
            CacheLookup::Hit(response) => CacheOutcome {
                response,
                status: CacheStatus::Hit,
            },
            CacheLookup::Bypass => CacheOutcome {
                response: compute().await,
                status: CacheStatus::Bypass,
            },
            CacheLookup::Miss { key, ttl } => {
                let response = compute().await;
                self.store(&key, ttl, &response);
                CacheOutcome {
                    response,
                    status: CacheStatus::Miss,
                }
            }
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.store.invalidate(key);
        if removed {
            tracing::debug!(key, "Invalidated cache entry");
        }
        removed
    }

    pub fn invalidate_matching(&self, pattern: &KeyPattern) -> usize {
        self.store.invalidate_matching(pattern)
    }

    /// Remove every entry whose route starts with `path_prefix`.
    pub fn invalidate_prefix(&self, path_prefix: &str) -> usize {
        let prefix = CacheKeyPolicy::route_prefix(path_prefix);
        let removed = self.store.invalidate_where(|key| key.starts_with(&prefix));
        tracing::debug!(prefix = %path_prefix, removed, "Invalidated cache entries by prefix");
        removed
    }

    pub fn clear(&self) {
        self.store.clear();
        tracing::info!("Response cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }
}

impl Sweepable for ResponseCache {
    fn component(&self) -> &str {
        "cache"
    }

    fn sweep_expired(&self) -> usize {
        ResponseCache::sweep_expired(self)
    }
}
