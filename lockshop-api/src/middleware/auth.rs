//! Authentication stage.
//!
//! Requests matching a [`PublicRoutes`] entry skip token validation. Every
//! other request must carry `Authorization: Bearer <access token>`; the
//! validated caller is stored in the request extensions as [`AuthContext`].

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::{bearer_token, AuthContext, TokenService};
use crate::error::{ApiError, ApiResult};
use crate::middleware::logging::RequestContext;

// ============================================================================
// SKIP-AUTH MARKERS
// ============================================================================

/// One public route: a method and a path pattern.
///
/// Pattern segments written `{name}` match any single path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicRoute {
    pub method: Option<Method>,
    pub segments: Vec<String>,
}

impl PublicRoute {
    fn matches(&self, method: &Method, path: &str) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        let mut parts = path.trim_end_matches('/').split('/');
        let mut patterns = self.segments.iter();
        loop {
            match (parts.next(), patterns.next()) {
                (None, None) => return true,
                (Some(part), Some(pattern)) => {
                    let wildcard = pattern.starts_with('{') && pattern.ends_with('}');
                    if !(wildcard && !part.is_empty()) && part != pattern {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

/// Routes that skip authentication.
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    routes: Vec<PublicRoute>,
}

impl PublicRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `pattern` public for one method.
    pub fn allow(mut self, method: Method, pattern: &str) -> Self {
        self.routes.push(PublicRoute {
            method: Some(method),
            segments: split_pattern(pattern),
        });
        self
    }

    /// Mark `pattern` public for every method.
    pub fn allow_any(mut self, pattern: &str) -> Self {
        self.routes.push(PublicRoute {
            method: None,
            segments: split_pattern(pattern),
        });
        self
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.routes.iter().any(|r| r.matches(method, path))
    }
}

fn split_pattern(pattern: &str) -> Vec<String> {
    pattern
        .trim_end_matches('/')
        .split('/')
        .map(str::to_string)
        .collect()
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Shared state for the authentication stage.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub tokens: TokenService,
    pub public_routes: Arc<PublicRoutes>,
}

impl AuthMiddlewareState {
    pub fn new(tokens: TokenService, public_routes: PublicRoutes) -> Self {
        Self {
            tokens,
            public_routes: Arc::new(public_routes),
        }
    }
}

/// Validate the bearer token of a request.
pub fn authenticate(tokens: &TokenService, auth_header: Option<&str>) -> ApiResult<AuthContext> {
    let header_value = auth_header.ok_or_else(|| ApiError::unauthenticated("Not authenticated"))?;
    let token = bearer_token(header_value).ok_or_else(|| {
        ApiError::unauthenticated("Authorization header must use the Bearer scheme")
    })?;
    let claims = tokens.verify_access(token)?;
    Ok(AuthContext::from_claims(&claims))
}

pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state
        .public_routes
        .is_public(request.method(), request.uri().path())
    {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let context = authenticate(&state.tokens, auth_header)?;

    if let Some(request_context) = request.extensions_mut().get_mut::<RequestContext>() {
        request_context.subject = Some(context.growid.clone());
    }
    tracing::debug!(growid = %context.growid, role = %context.role, "Authenticated");
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// ============================================================================
// EXTRACTORS
// ============================================================================

/// Extractor for the authenticated caller.
///
/// Fails with 401 on routes the auth stage skipped.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| ApiError::unauthenticated("Not authenticated"))
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extractor that only admits admins.
#[derive(Debug, Clone)]
pub struct AdminExtractor(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AdminExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthExtractor(context) = AuthExtractor::from_request_parts(parts, state).await?;
        context.require_admin()?;
        Ok(AdminExtractor(context))
    }
}

impl std::ops::Deref for AdminExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{test_clocks, AuthConfig, FixedClock};
    use crate::error::ErrorCode;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use lockshop_core::UserRole;
    use tower::ServiceExt;

    fn tokens_at(clock: FixedClock) -> TokenService {
        TokenService::new(
            AuthConfig::with_secret("auth-stage-test-secret", Arc::new(clock))
                .expect("test secret should be valid"),
        )
    }

    fn test_app(tokens: TokenService) -> Router {
        let public = PublicRoutes::new()
            .allow(Method::GET, "/api/v1/products")
            .allow(Method::GET, "/api/v1/products/{code}");
        let state = AuthMiddlewareState::new(tokens, public);

        Router::new()
            .route("/api/v1/products", get(|| async { "catalog" }))
            .route("/api/v1/products/:code", get(|| async { "product" }))
            .route(
                "/api/v1/products/:code/stock",
                get(|AuthExtractor(auth): AuthExtractor| async move { auth.growid }),
            )
            .route(
                "/api/v1/admin/logs",
                get(|AdminExtractor(auth): AdminExtractor| async move { auth.growid }),
            )
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }

    async fn call(app: Router, path: &str, auth: Option<String>) -> Result<Response, String> {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        app.oneshot(builder.body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| e.to_string())
    }

    fn error_code(response: &Response) -> Option<ErrorCode> {
        response.extensions().get::<ApiError>().map(|e| e.code)
    }

    #[test]
    fn test_public_route_matching() {
        let public = PublicRoutes::new()
            .allow(Method::GET, "/api/v1/products/{code}")
            .allow_any("/health");
        assert!(public.is_public(&Method::GET, "/api/v1/products/DL"));
        assert!(public.is_public(&Method::GET, "/api/v1/products/DL/"));
        assert!(!public.is_public(&Method::PATCH, "/api/v1/products/DL"));
        assert!(!public.is_public(&Method::GET, "/api/v1/products/DL/stock"));
        assert!(!public.is_public(&Method::GET, "/api/v1/products"));
        assert!(public.is_public(&Method::POST, "/health"));
    }

    #[tokio::test]
    async fn test_public_routes_skip_auth() -> Result<(), String> {
        let app = test_app(tokens_at(test_clocks::valid()));
        let response = call(app.clone(), "/api/v1/products", None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let response = call(app, "/api/v1/products/DL", None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_header_is_authentication_error() -> Result<(), String> {
        let app = test_app(tokens_at(test_clocks::valid()));
        let response = call(app, "/api/v1/products/DL/stock", None).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&response), Some(ErrorCode::AuthenticationError));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_token_is_token_expired_error() -> Result<(), String> {
        let pair = tokens_at(test_clocks::expired())
            .issue("STEVE")
            .map_err(|e| e.to_string())?;
        let app = test_app(tokens_at(test_clocks::valid()));
        let response = call(
            app,
            "/api/v1/products/DL/stock",
            Some(format!("Bearer {}", pair.access_token)),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&response), Some(ErrorCode::TokenExpiredError));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_and_refresh_tokens_are_invalid() -> Result<(), String> {
        let tokens = tokens_at(test_clocks::valid());
        let pair = tokens.issue("STEVE").map_err(|e| e.to_string())?;
        let app = test_app(tokens);

        let response = call(
            app.clone(),
            "/api/v1/products/DL/stock",
            Some("Bearer not-a-jwt".to_string()),
        )
        .await?;
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidTokenError));

        let response = call(
            app,
            "/api/v1/products/DL/stock",
            Some(format!("Bearer {}", pair.refresh_token)),
        )
        .await?;
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidTokenError));
        Ok(())
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() -> Result<(), String> {
        let tokens = tokens_at(test_clocks::valid());
        let pair = tokens.issue("STEVE").map_err(|e| e.to_string())?;
        let response = call(
            test_app(tokens),
            "/api/v1/products/DL/stock",
            Some(format!("Bearer {}", pair.access_token)),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(&body[..], b"STEVE");
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_extractor_requires_admin_role() -> Result<(), String> {
        let tokens = tokens_at(test_clocks::valid());
        let basic = tokens.issue("STEVE").map_err(|e| e.to_string())?;
        let admin = tokens
            .issue_with_role("OWNER", UserRole::Admin)
            .map_err(|e| e.to_string())?;
        let app = test_app(tokens);

        let response = call(
            app.clone(),
            "/api/v1/admin/logs",
            Some(format!("Bearer {}", basic.access_token)),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_code(&response), Some(ErrorCode::PermissionDenied));

        let response = call(
            app,
            "/api/v1/admin/logs",
            Some(format!("Bearer {}", admin.access_token)),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
