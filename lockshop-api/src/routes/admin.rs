//! Administrative Routes
//!
//! Response cache clearing, per-user rate limit resets and the audit log.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use crate::constants::clamp_limit;
use crate::error::ApiResult;
use crate::extractors::ValidJson;
use crate::middleware::AdminExtractor;
use crate::routes::private;
use crate::services::record_admin_action;
use crate::state::AppState;
use crate::types::{CacheClearRequest, ClearedResponse, ListQuery};
use crate::validation::validate_growid;

const CACHE_KEY_PREFIX: &str = "cache:";

/// Cache-key glob for a requested pattern; keys always start with `cache:`.
fn cache_pattern(pattern: Option<&str>) -> String {
    match pattern.map(str::trim).filter(|p| !p.is_empty()) {
        None => format!("{}*", CACHE_KEY_PREFIX),
        Some(p) if p.starts_with(CACHE_KEY_PREFIX) => p.to_string(),
        Some(p) => format!("{}{}", CACHE_KEY_PREFIX, p),
    }
}

/// POST /api/v1/admin/cache/clear - `{"pattern": "/api/v1/products*"}`, or `{}` for all
pub async fn clear_cache(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    ValidJson(req): ValidJson<CacheClearRequest>,
) -> ApiResult<impl IntoResponse> {
    let pattern = cache_pattern(req.pattern.as_deref());
    let removed = state.cache.clear(&pattern).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "cache.clear",
        &pattern,
        Some(format!("removed={}", removed)),
    )
    .await;
    Ok(private(ClearedResponse { removed }))
}

/// POST /api/v1/admin/rate-limits/:growid/reset
pub async fn reset_rate_limits(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(growid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    validate_growid("growid", &growid)?;
    let removed = state.limiter.reset_limits(&growid).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "rate_limit.reset",
        &growid,
        Some(format!("removed={}", removed)),
    )
    .await;
    Ok(private(ClearedResponse { removed }))
}

/// GET /api/v1/admin/logs - Recent audit entries, newest first
pub async fn admin_logs(
    State(state): State<AppState>,
    AdminExtractor(_admin): AdminExtractor,
    Query(params): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let logs = state
        .store
        .admin_logs_recent(clamp_limit(params.limit))
        .await?;
    Ok(private(logs))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/admin/cache/clear", post(clear_cache))
        .route("/admin/rate-limits/:growid/reset", post(reset_rate_limits))
        .route("/admin/logs", get(admin_logs))
}
