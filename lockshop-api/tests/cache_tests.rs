//! Response cache behavior through the full pipeline.

mod support;

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use lockshop_api::ApiConfig;
use serde_json::json;
use support::*;

#[tokio::test]
async fn query_order_shares_an_entry() {
    let (app, _) = test_app();

    let first = send(
        &app,
        request(Method::GET, "/api/v1/products?include_stock=true&x=1", None, None),
    )
    .await;
    assert_eq!(first.headers()["x-cache"], "MISS");

    let reordered = send(
        &app,
        request(Method::GET, "/api/v1/products?x=1&include_stock=true", None, None),
    )
    .await;
    assert_eq!(reordered.headers()["x-cache"], "HIT");

    let different = send(
        &app,
        request(Method::GET, "/api/v1/products?include_stock=false", None, None),
    )
    .await;
    assert_eq!(different.headers()["x-cache"], "MISS");
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let config = ApiConfig {
        cache_ttl: Duration::from_millis(50),
        ..test_config()
    };
    let (app, _) = test_app_with(config);

    send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
    let hit = send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
    assert_eq!(hit.headers()["x-cache"], "HIT");

    tokio::time::sleep(Duration::from_millis(120)).await;
    let expired = send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
    assert_eq!(expired.headers()["x-cache"], "MISS");
}

#[tokio::test]
async fn error_responses_are_not_stored() {
    let (app, _) = test_app();
    for _ in 0..2 {
        let response = send(
            &app,
            request(Method::GET, "/api/v1/products/MISSING", None, None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-cache").is_none());
    }
}

#[tokio::test]
async fn disabled_cache_leaves_no_marker() {
    let config = ApiConfig {
        cache_enabled: false,
        ..test_config()
    };
    let (app, _) = test_app_with(config);
    for _ in 0..2 {
        let response = send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-cache").is_none());
    }
}

#[tokio::test]
async fn gzipped_entries_are_not_replayed_to_plain_clients() {
    let (app, _) = test_app();
    let admin = admin_token(&app).await;
    call(
        &app,
        Method::POST,
        "/api/v1/products",
        Some(&admin),
        Some(json!({
            "code": "BGL",
            "name": "Blue Gem Lock",
            "price": 30000000,
            "description": "x".repeat(2000),
        })),
        StatusCode::CREATED,
    )
    .await;

    let mut gzip_req = request(Method::GET, "/api/v1/products", None, None);
    gzip_req
        .headers_mut()
        .insert(header::ACCEPT_ENCODING, "gzip".parse().expect("valid header"));
    let gzipped = send(&app, gzip_req).await;
    assert_eq!(gzipped.headers()[header::CONTENT_ENCODING], "gzip");

    let plain = send(&app, request(Method::GET, "/api/v1/products", None, None)).await;
    assert_eq!(plain.status(), StatusCode::OK);
    assert!(plain.headers().get(header::CONTENT_ENCODING).is_none());
    let products = body_json(plain).await;
    assert_eq!(products[0]["code"], "BGL");
}
