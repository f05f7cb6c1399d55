//! Request logging stage.
//!
//! Assigns the request id, attaches the [`RequestContext`] and wraps the
//! rest of the pipeline in a span carrying method, path and request id.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Per-request context, discarded after the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub started_at: DateTime<Utc>,
    /// Authenticated growid, set by the auth stage.
    pub subject: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            started_at: Utc::now(),
            subject: None,
        }
    }
}

/// Inbound request id, if present and sane.
fn inbound_request_id(request: &Request) -> Option<String> {
    let value = request.headers().get(&REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty()
        || value.len() > MAX_REQUEST_ID_LEN
        || !value.chars().all(|c| c.is_ascii_graphic())
    {
        return None;
    }
    Some(value.to_string())
}

pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let request_id = inbound_request_id(&request).unwrap_or_else(|| Uuid::now_v7().to_string());
    request
        .extensions_mut()
        .insert(RequestContext::new(request_id.clone()));

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!(
        "request",
        method = %method,
        path = %path,
        request_id = %request_id,
    );

    let start = Instant::now();
    let mut response = async move {
        tracing::debug!("Request started");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}
