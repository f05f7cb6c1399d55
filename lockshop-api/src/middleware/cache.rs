//! Response caching stage.
//!
//! Serves GET requests from the [`ResponseCache`] and stores successful
//! responses on a miss. Sits inside rate limiting and authentication, so a
//! throttled or unauthenticated request never reaches the cache.

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{Request, State},
    http::{header, response::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use futures_util::{stream, StreamExt};
use lockshop_storage::CachedResponse;

use crate::cache::{cache_key, is_cacheable_request, is_storable_response, ResponseCache};
use crate::error::ApiError;

pub static CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

/// Largest response body buffered for storage. Larger bodies pass through
/// unstored.
pub const MAX_CACHED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Headers never copied into a cache entry.
const UNCACHED_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection", "x-cache"];

/// Shared state for the caching stage.
#[derive(Debug, Clone)]
pub struct CacheState {
    pub cache: ResponseCache,
    pub enabled: bool,
}

impl CacheState {
    pub fn new(cache: ResponseCache, enabled: bool) -> Self {
        Self { cache, enabled }
    }
}

fn accepts_gzip(request: &Request) -> bool {
    request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|enc| enc.split(';').next().map(str::trim) == Some("gzip"))
        })
        .unwrap_or(false)
}

fn is_gzipped(entry: &CachedResponse) -> bool {
    entry
        .header("content-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
}

/// Rebuild a response from a cache entry.
fn replay(entry: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(entry.body));
    *response.status_mut() = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
    let headers = response.headers_mut();
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    mark(headers, "HIT");
    response
}

pub async fn cache_middleware(
    State(state): State<CacheState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.enabled || !is_cacheable_request(request.method()) {
        return Ok(next.run(request).await);
    }

    let key = cache_key(request.uri().path(), request.uri().query());
    let gzip_ok = accepts_gzip(&request);

    if let Some(entry) = state.cache.get(&key).await {
        if gzip_ok || !is_gzipped(&entry) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(replay(entry));
        }
    }

    let response = next.run(request).await;
    if !is_storable_response(response.status(), response.headers()) {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    mark(&mut parts.headers, "MISS");
    if declared_len(&parts.headers, &body) > MAX_CACHED_BODY_BYTES as u64 {
        tracing::debug!(key = %key, "Response too large to cache");
        return Ok(Response::from_parts(parts, body));
    }

    let mut chunks = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::error!(key = %key, error = %e, "Failed to read response body");
            ApiError::internal()
        })?;
        buffered.extend_from_slice(&chunk);
        if buffered.len() > MAX_CACHED_BODY_BYTES {
            // Hand on what was read, then the rest of the stream
            tracing::debug!(key = %key, "Response too large to cache");
            let head = stream::iter([Ok::<Bytes, axum::Error>(Bytes::from(buffered))]);
            return Ok(Response::from_parts(
                parts,
                Body::from_stream(head.chain(chunks)),
            ));
        }
    }

    let bytes = Bytes::from(buffered);
    state.cache.set(&key, &entry_for(&parts, &bytes)).await;
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

fn mark(headers: &mut HeaderMap, status: &'static str) {
    headers.insert(CACHE_STATUS_HEADER.clone(), HeaderValue::from_static(status));
}

/// Body length known before reading: `Content-Length` or the size hint.
fn declared_len(headers: &HeaderMap, body: &Body) -> u64 {
    let from_header = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    from_header.max(body.size_hint().lower())
}

fn entry_for(parts: &Parts, body: &Bytes) -> CachedResponse {
    CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter(|(name, _)| !UNCACHED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body: body.to_vec(),
        media_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::{middleware, routing::get, Router};
    use lockshop_storage::InMemoryCacheBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_app(calls: Arc<AtomicUsize>) -> Router {
        let cache = ResponseCache::new(
            Arc::new(InMemoryCacheBackend::new()),
            Duration::from_secs(300),
            Duration::from_millis(200),
        );
        let private_calls = Arc::clone(&calls);
        Router::new()
            .route(
                "/products",
                get(move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        axum::Json(serde_json::json!({"products": ["DL", "BGL"]}))
                    }
                }),
            )
            .route(
                "/dump",
                get(|| async { vec![b'x'; MAX_CACHED_BODY_BYTES + 1024 * 1024] }),
            )
            .route(
                "/stream",
                get(|| async {
                    let chunk = Bytes::from(vec![b'y'; 512 * 1024]);
                    let chunks = (0..6).map(move |_| Ok::<Bytes, std::io::Error>(chunk.clone()));
                    Body::from_stream(stream::iter(chunks))
                }),
            )
            .route(
                "/me",
                get(move || {
                    let calls = Arc::clone(&private_calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        ([(header::CACHE_CONTROL, "private")], "me")
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(
                CacheState::new(cache, true),
                cache_middleware,
            ))
    }

    async fn get_uri(app: &Router, uri: &str) -> Result<Response, String> {
        app.clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())
    }

    fn cache_status(response: &Response) -> Option<&str> {
        response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_warm_cache_skips_handler() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = test_app(Arc::clone(&calls));

        let first = get_uri(&app, "/products?b=2&a=1").await?;
        assert_eq!(cache_status(&first), Some("MISS"));

        let second = get_uri(&app, "/products?a=1&b=2").await?;
        assert_eq!(cache_status(&second), Some("HIT"));
        assert_eq!(second.status(), StatusCode::OK);
        let body = to_bytes(second.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(&body[..], br#"{"products":["DL","BGL"]}"#);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_private_responses_are_not_cached() -> Result<(), String> {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = test_app(Arc::clone(&calls));

        get_uri(&app, "/me").await?;
        let second = get_uri(&app, "/me").await?;
        assert_eq!(cache_status(&second), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_body_passes_through_unstored() -> Result<(), String> {
        let app = test_app(Arc::new(AtomicUsize::new(0)));

        for _ in 0..2 {
            let response = get_uri(&app, "/dump").await?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(cache_status(&response), Some("MISS"));
            let body = to_bytes(response.into_body(), usize::MAX)
                .await
                .map_err(|e| e.to_string())?;
            assert_eq!(body.len(), MAX_CACHED_BODY_BYTES + 1024 * 1024);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_stream_is_forwarded_whole() -> Result<(), String> {
        let app = test_app(Arc::new(AtomicUsize::new(0)));

        for _ in 0..2 {
            let response = get_uri(&app, "/stream").await?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(cache_status(&response), Some("MISS"));
            let body = to_bytes(response.into_body(), usize::MAX)
                .await
                .map_err(|e| e.to_string())?;
            assert_eq!(body.len(), 6 * 512 * 1024);
            assert!(body.iter().all(|b| *b == b'y'));
        }
        Ok(())
    }

    #[test]
    fn test_accepts_gzip_parsing() -> Result<(), String> {
        let req = axum::http::Request::builder()
            .header("accept-encoding", "br, gzip;q=0.8")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        assert!(accepts_gzip(&req));

        let req = axum::http::Request::builder()
            .header("accept-encoding", "identity")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        assert!(!accepts_gzip(&req));
        Ok(())
    }
}
