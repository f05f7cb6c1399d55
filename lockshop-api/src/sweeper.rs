//! Expired Entry Sweeper
//!
//! Background task that removes expired rate-limit windows and cached
//! responses on a fixed interval. Lookups already ignore expired entries;
//! the sweep only bounds storage growth.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(sweeper_task(limiter, cache, interval, shutdown_rx));
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::ResponseCache;
use crate::limiter::RateLimiter;

/// Counters for sweeper activity.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub counters_removed: AtomicU64,
    pub cache_entries_removed: AtomicU64,
    pub sweep_cycles: AtomicU64,
    pub sweep_errors: AtomicU64,
}

impl SweepMetrics {
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            counters_removed: self.counters_removed.load(Ordering::Relaxed),
            cache_entries_removed: self.cache_entries_removed.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub counters_removed: u64,
    pub cache_entries_removed: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

/// One sweep over both backends. Failures are logged and counted.
pub async fn sweep_once(limiter: &RateLimiter, cache: &ResponseCache, metrics: &SweepMetrics) {
    match limiter.purge_expired().await {
        Ok(removed) => {
            metrics.counters_removed.fetch_add(removed, Ordering::Relaxed);
        }
        Err(e) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Failed to purge expired rate-limit windows");
        }
    }

    match cache.purge_expired().await {
        Ok(removed) => {
            metrics.cache_entries_removed.fetch_add(removed, Ordering::Relaxed);
        }
        Err(e) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Failed to purge expired cache entries");
        }
    }

    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
}

/// Run [`sweep_once`] every `every` until `shutdown_rx` turns true.
pub async fn sweeper_task(
    limiter: RateLimiter,
    cache: ResponseCache,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Sweeper started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(&limiter, &cache, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        counters_removed = snapshot.counters_removed,
        cache_entries_removed = snapshot.cache_entries_removed,
        sweep_cycles = snapshot.sweep_cycles,
        sweep_errors = snapshot.sweep_errors,
        "Sweeper stopped"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleLimits;
    use lockshop_storage::{CachedResponse, InMemoryCacheBackend, InMemoryCounterStore};

    fn fixtures(window: Duration) -> (RateLimiter, ResponseCache) {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            window,
            RoleLimits::default(),
            Duration::from_secs(1),
        );
        let cache = ResponseCache::new(
            Arc::new(InMemoryCacheBackend::new()),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        (limiter, cache)
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let (limiter, cache) = fixtures(Duration::from_millis(20));
        limiter.check("rl:ip:1.2.3.4:/x", None).await;
        cache
            .set(
                "cache:/api/v1/rates",
                &CachedResponse {
                    status: 200,
                    headers: vec![],
                    body: b"[]".to_vec(),
                    media_type: Some("application/json".to_string()),
                },
            )
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        let metrics = SweepMetrics::default();
        sweep_once(&limiter, &cache, &metrics).await;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters_removed, 1);
        assert_eq!(snapshot.cache_entries_removed, 1);
        assert_eq!(snapshot.sweep_cycles, 1);
        assert_eq!(snapshot.sweep_errors, 0);
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown() {
        let (limiter, cache) = fixtures(Duration::from_secs(60));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper_task(limiter, cache, Duration::from_millis(5), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).expect("sweeper still listening");
        let metrics = handle.await.expect("sweeper task joins");
        assert!(metrics.snapshot().sweep_cycles >= 1);
    }
}
