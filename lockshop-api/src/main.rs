//! Lockshop API Server Entry Point
//!
//! Bootstraps configuration, selects the record store backend and starts
//! the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use lockshop_api::constants::{DEFAULT_BIND_HOST, DEFAULT_PORT};
use lockshop_api::telemetry::init_tracing;
use lockshop_api::{
    create_api_router, sweeper_task, ApiConfig, ApiError, ApiResult, AppState, AuthConfig,
    BackendKind, DbConfig, PgCacheBackend, PgCounterStore, PgStore,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();

    let state = match api_config.backend {
        BackendKind::Memory => {
            tracing::warn!("Using in-memory backend; all data is lost on restart");
            AppState::in_memory(api_config, auth_config)
        }
        BackendKind::Postgres => {
            let db_config = DbConfig::from_env();
            tracing::info!(host = %db_config.host, db = %db_config.dbname, "Connecting to PostgreSQL");
            let store = PgStore::connect(&db_config).await?;
            let pool = store.pool().clone();
            AppState::new(
                Arc::new(store),
                Arc::new(PgCounterStore::new(pool.clone())),
                Arc::new(PgCacheBackend::new(pool)),
                api_config,
                auth_config,
            )
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweeper_task(
        state.limiter.clone(),
        state.cache.clone(),
        state.config.sweep_interval,
        shutdown_rx,
    ));

    let app = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Lockshop API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| server_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    })
    .await
    .map_err(|e| server_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    Ok(())
}

fn server_error(detail: String) -> ApiError {
    tracing::error!("{}", detail);
    ApiError::http(StatusCode::INTERNAL_SERVER_ERROR, detail)
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host =
        std::env::var("LOCKSHOP_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("LOCKSHOP_API_PORT").ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::bad_request(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::bad_request(format!("Invalid bind address {}: {}", addr, e)))
}
