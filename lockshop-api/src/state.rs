//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use lockshop_storage::{
    CacheBackend, CounterStore, InMemoryCacheBackend, InMemoryCounterStore, InMemoryStore,
    ShopStore,
};

use crate::auth::{AuthConfig, TokenService};
use crate::cache::ResponseCache;
use crate::config::ApiConfig;
use crate::limiter::RateLimiter;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Record store handle, injected at startup.
    pub store: Arc<dyn ShopStore>,
    pub tokens: TokenService,
    pub limiter: RateLimiter,
    pub cache: ResponseCache,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    /// Assemble state from a record store and the two auxiliary backends.
    pub fn new(
        store: Arc<dyn ShopStore>,
        counters: Arc<dyn CounterStore>,
        cache_backend: Arc<dyn CacheBackend>,
        config: ApiConfig,
        auth: AuthConfig,
    ) -> Self {
        let limiter = RateLimiter::new(
            counters,
            config.rate_limit_window,
            config.role_limits,
            config.backend_timeout,
        );
        let cache = ResponseCache::new(cache_backend, config.cache_ttl, config.backend_timeout);
        Self {
            store,
            tokens: TokenService::new(auth),
            limiter,
            cache,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// State backed entirely by process memory.
    pub fn in_memory(config: ApiConfig, auth: AuthConfig) -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
            config,
            auth,
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &"<ShopStore>")
            .field("tokens", &self.tokens)
            .field("config", &self.config)
            .finish()
    }
}

crate::impl_from_ref!(Arc<dyn ShopStore>, store);
crate::impl_from_ref!(TokenService, tokens);
crate::impl_from_ref!(RateLimiter, limiter);
crate::impl_from_ref!(ResponseCache, cache);
crate::impl_from_ref!(Arc<ApiConfig>, config);
