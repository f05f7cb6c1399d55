//! Request validation stage.
//!
//! Bodies of mutating requests must be JSON. Field-level validation of the
//! body itself happens in the [`crate::extractors::ValidJson`] extractor.

use axum::{
    extract::Request,
    http::{header, Method},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

pub const JSON_REQUIRED_DETAIL: &str = "Content-Type must be application/json";

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

pub async fn validation_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    if carries_body(request.method()) {
        let is_json = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"));
        if !is_json {
            tracing::debug!(method = %request.method(), "Rejected non-JSON body");
            return Err(ApiError::bad_request(JSON_REQUIRED_DETAIL));
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::post, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app(calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/products",
                post(move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        StatusCode::CREATED
                    }
                }),
            )
            .layer(middleware::from_fn(validation_middleware))
    }

    async fn post_with(app: Router, content_type: Option<&str>) -> Result<Response, String> {
        let mut builder = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/products");
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        app.oneshot(builder.body(Body::from("{}")).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn test_non_json_rejected_before_handler() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = test_app(Arc::clone(&calls));

        let response = post_with(app.clone(), Some("text/plain")).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err = response
            .extensions()
            .get::<ApiError>()
            .ok_or("missing ApiError extension")?;
        assert_eq!(err.detail_text(), JSON_REQUIRED_DETAIL);

        let response = post_with(app, None).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_json_with_charset_passes() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let response = post_with(
            test_app(Arc::clone(&calls)),
            Some("application/json; charset=utf-8"),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
