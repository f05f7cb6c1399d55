//! REST API Routes Module
//!
//! Route handlers grouped by resource, the skip-auth route list, and the
//! router builder that wraps everything in the ordered middleware pipeline.

pub mod admin;
pub mod auth;
pub mod balances;
pub mod blacklist;
pub mod flags;
pub mod health;
pub mod products;
pub mod settings;
pub mod stock;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use lockshop_core::EnumParseError;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::constants::API_PREFIX;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::middleware::{
    auth_middleware, cache_middleware, compression_layer, error_handling_middleware,
    logging_middleware, metrics_middleware, rate_limit_middleware, validation_middleware,
    AuthMiddlewareState, CacheState, PublicRoutes, RateLimitState,
};
use crate::state::AppState;
use crate::telemetry::metrics_handler;

// ============================================================================
// RESPONSE HELPERS
// ============================================================================

/// JSON body marked `Cache-Control: private` so the response cache skips it.
pub(crate) fn private<T: Serialize>(body: T) -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "private")], Json(body))
}

/// JSON body with 201 Created.
pub(crate) fn created<T: Serialize>(body: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(body))
}

/// Parse an enum path segment; failures are 422 issues located at the path.
pub(crate) fn parse_path<T>(name: &str, raw: &str) -> ApiResult<T>
where
    T: FromStr<Err = EnumParseError>,
{
    raw.parse::<T>().map_err(|e| {
        ApiError::validation(vec![serde_json::json!({
            "loc": ["path", name],
            "msg": e.to_string(),
            "type": "type_error.enum",
        })])
    })
}

/// GET /metrics, never cached.
async fn metrics() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "no-store")], metrics_handler().await)
}

// ============================================================================
// SKIP-AUTH ROUTES
// ============================================================================

/// Routes reachable without a bearer token.
///
/// CORS preflights never reach the auth stage; the CORS layer answers them.
pub fn public_routes() -> PublicRoutes {
    PublicRoutes::new()
        .allow(Method::GET, "/health")
        .allow(Method::GET, "/metrics")
        .allow(Method::POST, "/api/v1/auth/register")
        .allow(Method::POST, "/api/v1/auth/login")
        .allow(Method::POST, "/api/v1/auth/refresh")
        .allow(Method::GET, "/api/v1/products")
        .allow(Method::GET, "/api/v1/products/{code}")
        .allow(Method::GET, "/api/v1/rates")
        .allow(Method::POST, "/api/v1/rates/convert")
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

fn is_production_environment() -> bool {
    std::env::var("LOCKSHOP_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::service_unavailable(
            "CORS origins not configured for production. Set LOCKSHOP_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production. Set LOCKSHOP_RATE_LIMIT_ENABLED=true."
        );
    }
    Ok(())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Every REST route under the version prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::create_router())
        .merge(users::create_router())
        .merge(products::create_router())
        .merge(stock::create_router())
        .merge(balances::create_router())
        .merge(settings::create_router())
        .merge(flags::create_router())
        .merge(blacklist::create_router())
        .merge(admin::create_router())
}

async fn route_not_found() -> ApiError {
    ApiError::new(ErrorCode::NotFound, "Not Found")
}

/// Build the complete application with the full middleware pipeline.
///
/// In production this refuses an insecure JWT secret or missing CORS
/// origins.
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    if is_production_environment() {
        state.tokens.config().validate_for_production()?;
        validate_api_config_for_production(&state.config)?;
    }
    Ok(build_router(state))
}

/// Assemble routes and pipeline without production checks.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let auth_state = AuthMiddlewareState::new(state.tokens.clone(), public_routes());
    let rate_limit_state = RateLimitState::new(
        state.limiter.clone(),
        state.tokens.clone(),
        config.rate_limit_enabled,
    )
    .with_trusted_proxies(config.trusted_proxies.clone());
    let cache_state = CacheState::new(state.cache.clone(), config.cache_enabled);

    let router = Router::new()
        .nest(API_PREFIX, api_routes())
        .merge(health::create_router())
        .route("/metrics", get(metrics))
        .fallback(route_not_found)
        .with_state(state);

    // Layers wrap what is already there: innermost first
    router
        .layer(from_fn(validation_middleware))
        .layer(compression_layer(config.compression_min_size))
        .layer(from_fn_with_state(cache_state, cache_middleware))
        .layer(from_fn_with_state(auth_state, auth_middleware))
        .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(logging_middleware))
        .layer(from_fn(error_handling_middleware))
        .layer(build_cors_layer(&config))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// Empty origins allow any origin (development).
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-response-time"),
            HeaderName::from_static("x-cache"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricted origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}
