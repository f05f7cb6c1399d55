//! Middleware pipeline for the Lockshop API
//!
//! - `error_handling`: renders every error body, catches panics
//! - `logging`: request id, request context, request span
//! - `metrics`: Prometheus recording and `X-Response-Time`
//! - `rate_limit`: fixed-window limits per caller and path
//! - `auth`: bearer token validation and skip-auth routes
//! - `cache`: GET response cache
//! - `compression`: gzip for compressible bodies
//! - `validation`: JSON content type on mutating requests
//!
//! # Middleware Order
//!
//! Layers wrap what is already there, so the innermost stage is added
//! first:
//!
//! ```ignore
//! Router::new()
//!     .route("/api/v1/products", get(handler))
//!     // Innermost (runs last on request, first on response)
//!     .layer(middleware::from_fn(validation_middleware))
//!     .layer(compression_layer(config.compression_min_size))
//!     .layer(middleware::from_fn_with_state(cache_state, cache_middleware))
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(middleware::from_fn(metrics_middleware))
//!     .layer(middleware::from_fn(logging_middleware))
//!     // Outermost
//!     .layer(middleware::from_fn(error_handling_middleware))
//! ```

pub mod auth;
pub mod cache;
pub mod compression;
pub mod error_handling;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod validation;

pub use auth::{
    auth_middleware, authenticate, AdminExtractor, AuthExtractor, AuthMiddlewareState,
    PublicRoutes,
};
pub use cache::{cache_middleware, CacheState, CACHE_STATUS_HEADER};
pub use compression::compression_layer;
pub use error_handling::error_handling_middleware;
pub use logging::{logging_middleware, RequestContext, REQUEST_ID_HEADER};
pub use metrics::{metrics_middleware, RESPONSE_TIME_HEADER};
pub use rate_limit::{extract_client_ip, rate_limit_middleware, RateLimitError, RateLimitState};
pub use validation::validation_middleware;
