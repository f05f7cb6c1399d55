//! Rate limiting through the full pipeline.

mod support;

use axum::http::{header, Method, StatusCode};
use lockshop_api::{ApiConfig, RoleLimits};
use support::*;

const PROXY_ADDR: &str = "10.0.0.2:443";

fn limited_config() -> ApiConfig {
    ApiConfig {
        role_limits: RoleLimits {
            admin: 50,
            premium: 5,
            basic: 3,
            default: 2,
        },
        ..test_config()
    }
}

#[tokio::test]
async fn anonymous_callers_are_limited_per_address() {
    let (app, _) = test_app_with(limited_config());

    for expected_remaining in ["1", "0"] {
        let response = send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let response = send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["type"], "RateLimitExceeded");
    assert_eq!(body["path"], "/api/v1/rates");
}

#[tokio::test]
async fn windows_are_per_path() {
    let (app, _) = test_app_with(limited_config());
    for _ in 0..2 {
        send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
    }
    let other = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn authenticated_callers_get_their_role_limit() {
    let (app, _) = test_app_with(limited_config());
    let token = register_and_login(&app, "STEVE", "steve").await;

    for _ in 0..3 {
        let response = send(
            &app,
            request(Method::GET, "/api/v1/users/me", Some(&token), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    }
    let response = send(
        &app,
        request(Method::GET, "/api/v1/users/me", Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn admin_reset_reopens_a_users_window() {
    let (app, _) = test_app_with(limited_config());
    let admin = admin_token(&app).await;
    let token = register_and_login(&app, "STEVE", "steve").await;

    for _ in 0..4 {
        send(
            &app,
            request(Method::GET, "/api/v1/users/me", Some(&token), None),
        )
        .await;
    }

    let cleared = call(
        &app,
        Method::POST,
        "/api/v1/admin/rate-limits/STEVE/reset",
        Some(&admin),
        Some(serde_json::json!({})),
        StatusCode::OK,
    )
    .await;
    assert!(cleared["removed"].as_u64().unwrap_or(0) >= 1);

    let response = send(
        &app,
        request(Method::GET, "/api/v1/users/me", Some(&token), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_reset_refuses_wildcard_growids() {
    let (app, _) = test_app_with(limited_config());
    let admin = admin_token(&app).await;
    let body = call(
        &app,
        Method::POST,
        "/api/v1/admin/rate-limits/STEVE*/reset",
        Some(&admin),
        Some(serde_json::json!({})),
        StatusCode::UNPROCESSABLE_ENTITY,
    )
    .await;
    assert_eq!(body["type"], "ValidationError");
}

#[tokio::test]
async fn disabled_limiter_adds_no_headers() {
    let config = ApiConfig {
        rate_limit_enabled: false,
        ..limited_config()
    };
    let (app, _) = test_app_with(config);
    for _ in 0..5 {
        let response = send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn forwarding_headers_from_clients_are_ignored() {
    let (app, _) = test_app_with(limited_config());

    let mut admitted = 0;
    for i in 0..10 {
        let mut req = request(Method::GET, "/api/v1/rates", None, None);
        req.headers_mut().insert(
            "x-forwarded-for",
            format!("10.0.0.{}", i).parse().expect("valid header"),
        );
        req.headers_mut().insert(
            "x-real-ip",
            format!("10.1.0.{}", i).parse().expect("valid header"),
        );
        if send(&app, req).await.status() == StatusCode::OK {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);
}

#[tokio::test]
async fn anonymous_windows_are_per_peer() {
    let (app, _) = test_app_with(limited_config());
    for _ in 0..3 {
        send(&app, request(Method::GET, "/api/v1/rates", None, None)).await;
    }
    let other = send(
        &app,
        request_from("198.51.100.9:4000", Method::GET, "/api/v1/rates", None, None),
    )
    .await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn trusted_proxy_forwards_client_addresses() {
    let config = ApiConfig {
        trusted_proxies: vec!["10.0.0.2".parse().expect("valid address")],
        ..limited_config()
    };
    let (app, _) = test_app_with(config);

    let via_proxy = |client: &str| {
        let mut req = request_from(PROXY_ADDR, Method::GET, "/api/v1/rates", None, None);
        req.headers_mut()
            .insert("x-forwarded-for", client.parse().expect("valid header"));
        req
    };

    for _ in 0..2 {
        let response = send(&app, via_proxy("192.0.2.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let throttled = send(&app, via_proxy("192.0.2.1")).await;
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

    // A prepended entry does not escape the window of the real client
    let spoofed = send(&app, via_proxy("198.18.0.1, 192.0.2.1")).await;
    assert_eq!(spoofed.status(), StatusCode::TOO_MANY_REQUESTS);

    let neighbour = send(&app, via_proxy("192.0.2.2")).await;
    assert_eq!(neighbour.status(), StatusCode::OK);
}
