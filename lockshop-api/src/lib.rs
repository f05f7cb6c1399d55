//! Lockshop API - REST Layer and Middleware Pipeline
//!
//! Axum service for the Lockshop currency shop: accounts and JWT auth,
//! balances and conversion rates, products and stock, settings, feature
//! flags, blacklist and audit log. Every request passes through one
//! middleware pipeline (CORS, error rendering, logging, metrics, rate
//! limiting, authentication, response caching, compression, body
//! validation) before reaching a handler.
//!
//! Records live behind [`lockshop_storage::ShopStore`]; the PostgreSQL
//! implementation is [`db::PgStore`].

#[macro_use]
pub mod macros;

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod extractors;
pub mod limiter;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod sweeper;
pub mod telemetry;
pub mod types;
pub mod validation;

pub use auth::{AuthConfig, AuthContext, Claims, TokenPair, TokenService};
pub use cache::ResponseCache;
pub use config::{ApiConfig, BackendKind, RoleLimits};
pub use db::{DbConfig, PgCacheBackend, PgCounterStore, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use limiter::{RateDecision, RateLimiter};
pub use routes::{build_router, create_api_router};
pub use state::AppState;
pub use sweeper::{sweeper_task, SweepMetrics};
