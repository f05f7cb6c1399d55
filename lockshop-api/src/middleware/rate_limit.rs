//! Rate limiting stage.
//!
//! Runs before authentication, so it peeks at the bearer token itself: a
//! valid access token keys the counter by user and selects the role limit,
//! anything else keys it by client address under the anonymous limit.
//!
//! The client address is the socket peer. Forwarding headers are only read
//! when the peer is a configured trusted proxy.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lockshop_core::UserRole;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::auth::{bearer_token, TokenService};
use crate::error::ApiError;
use crate::limiter::{ip_identity, rate_limit_key, user_identity, RateDecision, RateLimiter};

pub static RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

/// Shared state for the rate limiting stage.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
    pub tokens: TokenService,
    pub enabled: bool,
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl RateLimitState {
    pub fn new(limiter: RateLimiter, tokens: TokenService, enabled: bool) -> Self {
        Self {
            limiter,
            tokens,
            enabled,
            trusted_proxies: Arc::from(Vec::<IpAddr>::new()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }
}

/// Rate limit exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub decision: RateDecision,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::rate_limited().into_response();
        insert_limit_headers(&mut response, &self.decision);
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(self.decision.retry_after_secs.max(1)),
        );
        response
    }
}

fn insert_limit_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    headers.insert(
        RATE_LIMIT_LIMIT_HEADER.clone(),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        RATE_LIMIT_REMAINING_HEADER.clone(),
        HeaderValue::from(decision.remaining),
    );
}

fn header_str<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address of a request.
///
/// Without a trusted peer this is the socket address. Behind a trusted proxy
/// `X-Forwarded-For` is walked from the right, skipping trusted hops, so
/// entries the client prepended are never used.
pub fn extract_client_ip(request: &Request, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    if let Some(chain) = header_str(request, "x-forwarded-for") {
        let mut hops = chain.rsplit(',').map(str::trim).filter(|v| !v.is_empty());
        let client = hops.find(|hop| {
            hop.parse::<IpAddr>()
                .map_or(true, |ip| !trusted_proxies.contains(&ip))
        });
        if let Some(client) = client {
            return client.to_string();
        }
    }

    header_str(request, "x-real-ip")
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

/// Counter identity and role for a request.
fn caller_identity(state: &RateLimitState, request: &Request) -> (String, Option<UserRole>) {
    let claims = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .and_then(|token| state.tokens.verify_access(token).ok());

    match claims {
        Some(claims) => (user_identity(&claims.sub), Some(claims.user_role())),
        None => (
            ip_identity(&extract_client_ip(request, &state.trusted_proxies)),
            None,
        ),
    }
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let (identity, role) = caller_identity(&state, &request);
    let key = rate_limit_key(&identity, request.uri().path());
    let decision = state.limiter.check(&key, role).await;

    if !decision.allowed {
        tracing::info!(
            key = %key,
            limit = decision.limit,
            retry_after = decision.retry_after_secs,
            "Rate limit exceeded"
        );
        return Err(RateLimitError { decision });
    }

    let mut response = next.run(request).await;
    insert_limit_headers(&mut response, &decision);
    Ok(response)
}
