//! Fixed-window rate limiter over a [`CounterStore`].
//!
//! The counter backend is an injected trait object so the same limiter runs
//! against process memory or PostgreSQL. Every backend call is bounded by a
//! timeout; when the backend is down or slow the request is allowed.

use lockshop_core::UserRole;
use lockshop_storage::{BackendError, BackendResult, CounterStore};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RoleLimits;
use crate::telemetry::METRICS;

/// Prefix of every rate-limit counter key.
pub const KEY_PREFIX: &str = "rate_limit";

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the window resets. Zero when the backend was skipped.
    pub retry_after_secs: u64,
}

impl RateDecision {
    fn fail_open(limit: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            retry_after_secs: 0,
        }
    }
}

/// Counter key for a caller identity and a path.
pub fn rate_limit_key(identity: &str, path: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, identity, path)
}

/// Identity string of an authenticated caller.
pub fn user_identity(growid: &str) -> String {
    format!("user:{}", growid)
}

/// Identity string of an anonymous caller.
pub fn ip_identity(addr: &str) -> String {
    format!("ip:{}", addr)
}

/// Fixed-window limiter with per-role limits.
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    window: Duration,
    limits: RoleLimits,
    timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("limits", &self.limits)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        window: Duration,
        limits: RoleLimits,
        timeout: Duration,
    ) -> Self {
        Self {
            counters,
            window,
            limits,
            timeout,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limits(&self) -> RoleLimits {
        self.limits
    }

    /// Count a request against the anonymous limit.
    pub async fn allow(&self, key: &str) -> bool {
        self.check(key, None).await.allowed
    }

    /// Count a request and decide against the caller role's limit.
    ///
    /// A count above the limit is denied; the window is never extended.
    pub async fn check(&self, key: &str, role: Option<UserRole>) -> RateDecision {
        let limit = self.limits.limit_for(role);

        let hit = match tokio::time::timeout(
            self.timeout,
            self.counters.incr_with_expire(key, self.window),
        )
        .await
        {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Rate limit backend failed, allowing request");
                record_fault("rate_limit");
                return RateDecision::fail_open(limit);
            }
            Err(_) => {
                tracing::warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "Rate limit backend timed out, allowing request");
                record_fault("rate_limit");
                return RateDecision::fail_open(limit);
            }
        };

        let allowed = hit.count <= limit;
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_rate_limit(allowed);
        }

        RateDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(hit.count),
            retry_after_secs: hit.resets_in.as_secs().max(1),
        }
    }

    /// Clear every counter of a user. Returns how many were removed.
    ///
    /// Growids holding a key separator or a glob wildcard are refused, since
    /// their pattern would also match other users' counters.
    pub async fn reset_limits(&self, growid: &str) -> BackendResult<u64> {
        let pattern = format!("{}:{}:*", KEY_PREFIX, user_identity(growid));
        if growid.is_empty() || growid.contains([':', '*', '?', '\\']) {
            return Err(BackendError::InvalidPattern {
                pattern,
                reason: "growid contains a key separator or wildcard".to_string(),
            });
        }
        let removed = self.counters.delete_matching(&pattern).await?;
        tracing::info!(growid = %growid, removed, "Rate limits reset");
        Ok(removed)
    }

    /// Drop expired counters.
    pub async fn purge_expired(&self) -> BackendResult<u64> {
        self.counters.purge_expired().await
    }
}

fn record_fault(backend: &str) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_backend_fault(backend);
    }
}
