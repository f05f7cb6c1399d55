//! Request timing and Prometheus recording.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::{Duration, Instant};

use crate::telemetry::{normalize_path, METRICS};

pub const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Responses slower than this are logged as warnings.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(1);

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let route = normalize_path(&path);

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(method.as_str(), &route, status, elapsed.as_secs_f64());
    }

    if elapsed > SLOW_REQUEST_THRESHOLD {
        tracing::warn!(
            method = %method,
            path = %path,
            status,
            duration_ms = elapsed.as_millis() as u64,
            "Slow request"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(RESPONSE_TIME_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_response_time_header_is_set() -> Result<(), String> {
        let app = Router::new()
            .route("/stock/7", get(|| async { "ok" }))
            .layer(middleware::from_fn(metrics_middleware));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/stock/7")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;

        let value = response
            .headers()
            .get(RESPONSE_TIME_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or("missing x-response-time")?;
        assert!(value.parse::<f64>().is_ok());

        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.detail_text()))?;
        let count = metrics
            .http_requests_total
            .with_label_values(&["GET", "/stock/{id}", "200"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }
}
