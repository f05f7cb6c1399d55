//! Response cache policy over a [`CacheBackend`].
//!
//! Keys are `cache:{path}:{canonical query}`. The same [`cache_key`]
//! function builds keys on the read and write paths, so two requests that
//! differ only in query parameter order share one entry.

use axum::http::{header, HeaderMap, Method, StatusCode};
use lockshop_storage::{BackendResult, CacheBackend, CachedResponse};
use std::sync::Arc;
use std::time::Duration;

use crate::telemetry::METRICS;

/// Prefix of every cache key.
pub const KEY_PREFIX: &str = "cache";

/// Cache key for a path and raw query string.
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    let mut segments: Vec<&str> = query
        .unwrap_or("")
        .split('&')
        .filter(|s| !s.is_empty())
        .collect();
    segments.sort_unstable();
    format!("{}:{}:{}", KEY_PREFIX, path, segments.join("&"))
}

/// Only GET requests are served from or stored in the cache.
pub fn is_cacheable_request(method: &Method) -> bool {
    method == Method::GET
}

/// A response may be stored when it succeeded and is not marked private.
pub fn is_storable_response(status: StatusCode, headers: &HeaderMap) -> bool {
    if !status.is_success() {
        return false;
    }
    let Some(cache_control) = headers
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
    else {
        return true;
    };
    !cache_control
        .split(',')
        .map(|d| d.trim().to_ascii_lowercase())
        .any(|d| d == "private" || d == "no-store")
}

/// Response cache with a default TTL and bounded backend calls.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            ttl,
            timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a key. Backend faults and timeouts read as a miss.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let result = match tokio::time::timeout(self.timeout, self.backend.get(key)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, serving live");
                record_fault();
                None
            }
            Err(_) => {
                tracing::warn!(key = %key, "Cache read timed out, serving live");
                record_fault();
                None
            }
        };

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_cache_lookup(result.is_some());
        }
        result
    }

    /// Store with the default TTL. Faults are logged and dropped.
    pub async fn set(&self, key: &str, value: &CachedResponse) {
        self.set_with_ttl(key, value, self.ttl).await;
    }

    pub async fn set_with_ttl(&self, key: &str, value: &CachedResponse, ttl: Duration) {
        match tokio::time::timeout(self.timeout, self.backend.set(key, value, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Cache write failed");
                record_fault();
            }
            Err(_) => {
                tracing::warn!(key = %key, "Cache write timed out");
                record_fault();
            }
        }
    }

    /// Remove every entry matching a glob. Returns how many went.
    pub async fn clear(&self, pattern: &str) -> BackendResult<u64> {
        let removed = self.backend.clear(pattern).await?;
        tracing::info!(pattern = %pattern, removed, "Cache cleared");
        Ok(removed)
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> BackendResult<u64> {
        self.backend.purge_expired().await
    }
}

fn record_fault() {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_backend_fault("cache");
    }
}
