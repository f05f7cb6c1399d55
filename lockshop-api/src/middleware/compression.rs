//! Gzip compression stage.
//!
//! Wraps tower-http's `CompressionLayer` with a predicate limited to
//! compressible media types and a minimum body size.

use axum::http::{header, Extensions, HeaderMap, StatusCode, Version};
use tower_http::compression::{
    predicate::{Predicate, SizeAbove},
    CompressionLayer,
};

/// Media types worth compressing. `text/*` is matched by prefix.
pub const COMPRESSIBLE_TYPES: &[&str] = &[
    "application/json",
    "application/javascript",
    "application/xml",
];

/// Whether a `Content-Type` value names a compressible media type.
pub fn is_compressible_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/") || COMPRESSIBLE_TYPES.contains(&essence.as_str())
}

fn compressible_response(
    _status: StatusCode,
    _version: Version,
    headers: &HeaderMap,
    _extensions: &Extensions,
) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_compressible_type)
}

/// Gzip layer for bodies of at least `min_size` bytes.
pub fn compression_layer(min_size: u16) -> CompressionLayer<impl Predicate> {
    // SizeAbove is exclusive; shift by one so `min_size` itself compresses
    let threshold = min_size.saturating_sub(1);
    CompressionLayer::new()
        .gzip(true)
        .compress_when(SizeAbove::new(threshold).and(compressible_response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, response::Response, routing::get, Router};
    use tower::ServiceExt;

    fn test_app() -> Router {
        Router::new()
            .route(
                "/big",
                get(|| async {
                    let products: Vec<String> = (0..100).map(|i| format!("PRODUCT-{i:03}")).collect();
                    axum::Json(serde_json::json!({ "products": products }))
                }),
            )
            .route("/small", get(|| async { axum::Json(serde_json::json!({"ok": true})) }))
            .route(
                "/binary",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "application/octet-stream")],
                        vec![7u8; 4096],
                    )
                }),
            )
            .layer(compression_layer(500))
    }

    async fn get_gzip(path: &str) -> Result<Response, String> {
        test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .header("accept-encoding", "gzip")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())
    }

    fn encoding(response: &Response) -> Option<&str> {
        response
            .headers()
            .get("content-encoding")
            .and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_compressible_types() {
        assert!(is_compressible_type("application/json"));
        assert!(is_compressible_type("text/plain; charset=utf-8"));
        assert!(is_compressible_type("Application/XML"));
        assert!(!is_compressible_type("image/png"));
        assert!(!is_compressible_type("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_large_json_is_gzipped() -> Result<(), String> {
        let response = get_gzip("/big").await?;
        assert_eq!(encoding(&response), Some("gzip"));
        Ok(())
    }

    #[tokio::test]
    async fn test_small_and_binary_bodies_pass_through() -> Result<(), String> {
        assert_eq!(encoding(&get_gzip("/small").await?), None);
        assert_eq!(encoding(&get_gzip("/binary").await?), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_accept_encoding_means_identity() -> Result<(), String> {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/big")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(encoding(&response), None);
        Ok(())
    }
}
