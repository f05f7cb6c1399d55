//! Prometheus Metrics Definitions
//!
//! Registers the shop's metrics in the default registry and exposes them on
//! `/metrics` for scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use regex::Regex;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance, registered on first use.
pub static METRICS: Lazy<ApiResult<ShopMetrics>> = Lazy::new(ShopMetrics::new);

static UUID_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .ok()
});

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Replace ids in a path with `{id}` to keep label cardinality bounded.
pub fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Some(uuid) = UUID_SEGMENT.as_ref() {
        result = uuid.replace_all(&result, "{id}").into_owned();
    }
    if let Some(numeric) = NUMERIC_SEGMENT.as_ref() {
        result = numeric.replace_all(&result, "/{id}$1").into_owned();
    }
    result
}

fn registration_failed(name: &str, err: prometheus::Error) -> ApiError {
    tracing::error!(metric = name, error = %err, "Failed to register metric");
    ApiError::internal()
}

/// Container for all shop metrics.
#[derive(Clone)]
pub struct ShopMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: decision (allowed/denied)
    pub rate_limit_decisions_total: CounterVec,

    /// labels: result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// labels: backend (rate_limit/cache)
    pub backend_faults_total: CounterVec,
}

impl ShopMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "lockshop_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_failed("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "lockshop_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_failed("http_request_duration_seconds", e))?,

            rate_limit_decisions_total: register_counter_vec!(
                "lockshop_rate_limit_decisions_total",
                "Rate limit decisions",
                &["decision"]
            )
            .map_err(|e| registration_failed("rate_limit_decisions_total", e))?,

            cache_lookups_total: register_counter_vec!(
                "lockshop_cache_lookups_total",
                "Response cache lookups",
                &["result"]
            )
            .map_err(|e| registration_failed("cache_lookups_total", e))?,

            backend_faults_total: register_counter_vec!(
                "lockshop_backend_faults_total",
                "Limiter and cache backend failures recovered locally",
                &["backend"]
            )
            .map_err(|e| registration_failed("backend_faults_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_rate_limit(&self, allowed: bool) {
        let decision = if allowed { "allowed" } else { "denied" };
        self.rate_limit_decisions_total
            .with_label_values(&[decision])
            .inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_backend_fault(&self, backend: &str) {
        self.backend_faults_total
            .with_label_values(&[backend])
            .inc();
    }
}

/// GET /metrics - Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    // Force registration so a fresh process still exposes the shop metrics
    let _ = METRICS.as_ref();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Result<&'static ShopMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.detail_text()))
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = metrics()?;
        metrics.record_http_request("GET", "/api/v1/products", 200, 0.015);
        let count = metrics
            .http_requests_total
            .with_label_values(&["GET", "/api/v1/products", "200"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }

    #[test]
    fn test_record_decisions_and_lookups() -> Result<(), String> {
        let metrics = metrics()?;
        let before = metrics
            .rate_limit_decisions_total
            .with_label_values(&["denied"])
            .get();
        metrics.record_rate_limit(false);
        metrics.record_cache_lookup(true);
        metrics.record_backend_fault("cache");
        let after = metrics
            .rate_limit_decisions_total
            .with_label_values(&["denied"])
            .get();
        assert!(after > before);
        Ok(())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/v1/stock/42"), "/api/v1/stock/{id}");
        assert_eq!(
            normalize_path("/api/v1/stock/42/history"),
            "/api/v1/stock/{id}/history"
        );
        assert_eq!(
            normalize_path("/api/v1/requests/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/requests/{id}"
        );
        assert_eq!(normalize_path("/api/v1/products/DL"), "/api/v1/products/DL");
    }
}
