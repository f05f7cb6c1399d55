//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "lockshop_api=debug,tower_http=info,info";

/// Install the global JSON subscriber. Call once at startup.
pub fn init_tracing() -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
        .try_init()
        .map_err(|e| {
            eprintln!("Failed to init tracing subscriber: {}", e);
            ApiError::internal()
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
