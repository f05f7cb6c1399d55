//! Shared helpers for pipeline tests: an in-memory app and request builders.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use lockshop_api::auth::SystemClock;
use lockshop_api::{build_router, ApiConfig, AppState, AuthConfig};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "pipeline-test-secret-with-enough-entropy";
pub const ADMIN_GROWID: &str = "OWNER";
pub const PASSWORD: &str = "correct-horse-battery";
pub const CLIENT_ADDR: &str = "203.0.113.7:51000";

pub fn test_config() -> ApiConfig {
    ApiConfig {
        admin_growids: vec![ADMIN_GROWID.to_string()],
        ..ApiConfig::default()
    }
}

pub fn test_state(config: ApiConfig) -> AppState {
    let auth = AuthConfig::with_secret(TEST_SECRET, Arc::new(SystemClock))
        .expect("test secret should be accepted");
    AppState::in_memory(config, auth)
}

/// App and the state behind it, so tests can reach the store directly.
pub fn test_app_with(config: ApiConfig) -> (Router, AppState) {
    let state = test_state(config);
    (build_router(state.clone()), state)
}

pub fn test_app() -> (Router, AppState) {
    test_app_with(test_config())
}

pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    request_from(CLIENT_ADDR, method, uri, token, body)
}

/// Request arriving on a connection from `peer` (`ip:port`).
pub fn request_from(
    peer: &str,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).expect("request should build");
    let peer: SocketAddr = peer.parse().expect("peer should be ip:port");
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

pub async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.expect("router is infallible")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Send and decode, asserting the status.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    expected: StatusCode,
) -> Value {
    let response = send(app, request(method, uri, token, body)).await;
    let status = response.status();
    let json = body_json(response).await;
    assert_eq!(status, expected, "unexpected status for {}: {}", uri, json);
    json
}

/// Register a web account and log in; returns the access token.
pub async fn register_and_login(app: &Router, growid: &str, username: &str) -> String {
    call(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(serde_json::json!({
            "growid": growid,
            "username": username,
            "password": PASSWORD,
        })),
        StatusCode::CREATED,
    )
    .await;
    let login = call(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(serde_json::json!({ "username": username, "password": PASSWORD })),
        StatusCode::OK,
    )
    .await;
    login["access_token"]
        .as_str()
        .expect("login returns an access token")
        .to_string()
}

pub async fn admin_token(app: &Router) -> String {
    register_and_login(app, ADMIN_GROWID, "owner").await
}
