//! Lockshop Telemetry
//!
//! Prometheus metrics and structured JSON logging for the API layer.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, normalize_path, ShopMetrics, METRICS};
pub use tracer::init_tracing;
