//! Serialized HTTP responses keyed by request fingerprint.

use crate::error::BackendResult;
use crate::pattern::glob_to_regex;
use ::async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Everything needed to rebuild an equivalent response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    pub media_type: Option<String>,
}

impl CachedResponse {
    /// First header value with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Backend for the response cache.
///
/// Writes are last-write-wins. Expired entries must never be returned.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> BackendResult<Option<CachedResponse>>;

    async fn set(&self, key: &str, value: &CachedResponse, ttl: Duration) -> BackendResult<()>;

    /// Remove every entry whose key matches a glob. Returns how many went.
    async fn clear(&self, pattern: &str) -> BackendResult<u64>;

    /// Drop expired entries.
    async fn purge_expired(&self) -> BackendResult<u64>;
}

#[derive(Debug, Clone)]
struct Slot {
    value: CachedResponse,
    expires_at: Instant,
}

/// Response cache held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    slots: DashMap<String, Slot>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<CachedResponse>> {
        let now = Instant::now();
        let hit = self
            .slots
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.value.clone());
        if hit.is_none() {
            self.slots.remove_if(key, |_, slot| slot.expires_at <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: &CachedResponse, ttl: Duration) -> BackendResult<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> BackendResult<u64> {
        let matcher = glob_to_regex(pattern)?;
        let before = self.slots.len();
        self.slots.retain(|key, _| !matcher.is_match(key));
        Ok(before.saturating_sub(self.slots.len()) as u64)
    }

    async fn purge_expired(&self) -> BackendResult<u64> {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        Ok(before.saturating_sub(self.slots.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    fn sample() -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: br#"{"products":[]}"#.to_vec(),
            media_type: Some("application/json".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_then_expire() -> Result<(), BackendError> {
        let cache = InMemoryCacheBackend::new();
        cache.set("cache:/p:", &sample(), Duration::from_secs(300)).await?;
        assert_eq!(cache.get("cache:/p:").await?, Some(sample()));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get("cache:/p:").await?, None);
        assert!(cache.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_by_pattern() -> Result<(), BackendError> {
        let cache = InMemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);
        cache.set("cache:/api/v1/products:", &sample(), ttl).await?;
        cache.set("cache:/api/v1/products/DL:", &sample(), ttl).await?;
        cache.set("cache:/api/v1/rates:", &sample(), ttl).await?;

        assert_eq!(cache.clear("cache:/api/v1/products*").await?, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear("*").await?, 1);
        Ok(())
    }

    #[test]
    fn test_body_serializes_as_base64() -> Result<(), serde_json::Error> {
        let mut value = sample();
        value.body = vec![0x1f, 0x8b, 0x00, 0xff];
        let json = serde_json::to_string(&value)?;
        assert!(json.contains("\"body\":\"H4sA/w==\""));
        let back: CachedResponse = serde_json::from_str(&json)?;
        assert_eq!(back.body, value.body);
        Ok(())
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        assert_eq!(sample().header("Content-Type"), Some("application/json"));
        assert_eq!(sample().header("etag"), None);
    }
}
