//! Fixed-window request counters.

use crate::error::BackendResult;
use crate::pattern::glob_to_regex;
use ::async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterHit {
    /// Requests counted in the current window, including this one.
    pub count: u64,
    /// Time until the window closes.
    pub resets_in: Duration,
}

/// Backend holding per-key counters with expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new count as one atomic step.
    ///
    /// The first increment of a window sets the count to 1 and the expiry to
    /// `window`. Later increments in the same window never move the expiry.
    async fn incr_with_expire(&self, key: &str, window: Duration) -> BackendResult<CounterHit>;

    /// Delete every counter whose key matches a glob. Returns how many went.
    async fn delete_matching(&self, pattern: &str) -> BackendResult<u64>;

    /// Drop expired counters.
    async fn purge_expired(&self) -> BackendResult<u64>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    expires_at: Instant,
}

/// Counter store backed by a concurrent map.
///
/// Each increment runs under the map's shard lock for that key, which gives
/// the per-key atomicity the limiter relies on.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, Window>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and expired counters still held.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr_with_expire(&self, key: &str, window: Duration) -> BackendResult<CounterHit> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });
        if entry.expires_at <= now {
            *entry = Window {
                count: 0,
                expires_at: now + window,
            };
        }
        entry.count += 1;

        Ok(CounterHit {
            count: entry.count,
            resets_in: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn delete_matching(&self, pattern: &str) -> BackendResult<u64> {
        let matcher = glob_to_regex(pattern)?;
        let before = self.windows.len();
        self.windows.retain(|key, _| !matcher.is_match(key));
        Ok(before.saturating_sub(self.windows.len()) as u64)
    }

    async fn purge_expired(&self) -> BackendResult<u64> {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| window.expires_at > now);
        Ok(before.saturating_sub(self.windows.len()) as u64)
    }
}
