//! Outermost pipeline stage: renders every error body.
//!
//! Inner stages and handlers return [`ApiError`] values, whose responses
//! carry the error in their extensions. This stage replaces those bodies with
//! the final `{detail, type, timestamp, path}` shape, normalizes error
//! responses produced outside our code (unmatched routes, extractor
//! rejections) to the same shape, and turns panics into a generic 500.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::error::{ApiError, ErrorBody, ErrorCode};

/// Largest foreign error body read back as a detail string.
const MAX_FOREIGN_DETAIL_BYTES: usize = 1024;

pub async fn error_handling_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().clone();

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                method = %method,
                path = %path,
                panic = %panic_message(panic.as_ref()),
                "Request handler panicked"
            );
            return render(Response::new(Body::empty()), &ApiError::internal(), &path);
        }
    };

    if let Some(err) = response.extensions().get::<ApiError>().cloned() {
        log_error(&err, method.as_str(), &path);
        return render(response, &err, &path);
    }

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let err = foreign_error(status);
        let (parts, body) = response.into_parts();
        let detail = match err.code {
            ErrorCode::InternalServerError => err.detail.clone(),
            _ => read_detail(body, status).await.unwrap_or(err.detail.clone()),
        };
        let err = ApiError { detail, ..err };
        log_error(&err, method.as_str(), &path);
        return render(Response::from_parts(parts, Body::empty()), &err, &path);
    }

    response
}

/// Error for a non-2xx response that did not come from an [`ApiError`].
fn foreign_error(status: StatusCode) -> ApiError {
    let detail = status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string();
    let code = match status {
        StatusCode::UNAUTHORIZED => ErrorCode::AuthenticationError,
        StatusCode::FORBIDDEN => ErrorCode::PermissionDenied,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::CONFLICT => ErrorCode::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::ValidationError,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimitExceeded,
        StatusCode::SERVICE_UNAVAILABLE => ErrorCode::ServiceUnavailable,
        s if s.is_server_error() => {
            let mut err = ApiError::internal();
            err.status = Some(s);
            return err;
        }
        _ => ErrorCode::HttpException,
    };
    let mut err = ApiError::new(code, detail);
    err.status = Some(status);
    err
}

/// Plain-text body of a foreign 4xx response, when short and readable.
async fn read_detail(body: Body, status: StatusCode) -> Option<serde_json::Value> {
    if status.is_server_error() {
        return None;
    }
    let bytes = to_bytes(body, MAX_FOREIGN_DETAIL_BYTES).await.ok()?;
    let text = std::str::from_utf8(&bytes).ok()?.trim();
    if text.is_empty() || text.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(serde_json::Value::String(text.to_string()))
}

/// Replace the body of `response` with the final error body.
///
/// Headers set by inner stages (rate-limit headers, request id) are kept.
fn render(response: Response, err: &ApiError, path: &str) -> Response {
    let body = ErrorBody {
        timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        path: Some(path.to_string()),
        ..err.body()
    };

    let (mut parts, _) = response.into_parts();
    let rendered = (err.status_code(), Json(body)).into_response();
    let (rendered_parts, rendered_body) = rendered.into_parts();

    parts.status = rendered_parts.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CACHE_CONTROL);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts.extensions.remove::<ApiError>();
    Response::from_parts(parts, rendered_body)
}

fn log_error(err: &ApiError, method: &str, path: &str) {
    let status = err.status_code().as_u16();
    if err.status_code().is_server_error() {
        tracing::error!(method, path, status, error_type = %err.code, detail = %err.detail_text(), "Request failed");
    } else {
        tracing::info!(method, path, status, error_type = %err.code, detail = %err.detail_text(), "Request rejected");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INTERNAL_DETAIL;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn test_app() -> Router {
        Router::new()
            .route(
                "/conflict",
                get(|| async { Err::<(), _>(ApiError::conflict("product DL exists")) }),
            )
            .route(
                "/panic",
                get(|| async {
                    if true {
                        panic!("secret internal state: db password");
                    }
                    "unreachable"
                }),
            )
            .route(
                "/teapot",
                get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
            )
            .route("/ok", get(|| async { "fine" }))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(middleware::from_fn(error_handling_middleware))
    }

    async fn call(path: &str) -> Result<(StatusCode, serde_json::Value), String> {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        Ok((status, json))
    }

    #[tokio::test]
    async fn test_api_error_gets_timestamp_and_path() -> Result<(), String> {
        let (status, body) = call("/conflict").await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["type"], "Conflict");
        assert_eq!(body["detail"], "product DL exists");
        assert_eq!(body["path"], "/conflict");
        assert!(body["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
        Ok(())
    }

    #[tokio::test]
    async fn test_panic_becomes_generic_500() -> Result<(), String> {
        let (status, body) = call("/panic").await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["type"], "InternalServerError");
        assert_eq!(body["detail"], INTERNAL_DETAIL);
        assert!(!body.to_string().contains("password"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unmatched_route_is_not_found() -> Result<(), String> {
        let (status, body) = call("/nowhere").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "NotFound");
        assert_eq!(body["detail"], "Not Found");
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_status_is_http_exception() -> Result<(), String> {
        let (status, body) = call("/teapot").await?;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(body["type"], "HTTPException");
        assert_eq!(body["detail"], "short and stout");
        Ok(())
    }

    #[tokio::test]
    async fn test_success_passes_through() -> Result<(), String> {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ok")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(&bytes[..], b"fine");
        Ok(())
    }
}
