//! Blacklist REST API Routes (admin only)

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get},
    Router,
};

use crate::error::{ApiError, ApiResult};
use crate::extractors::ValidJson;
use crate::middleware::AdminExtractor;
use crate::routes::{created, private};
use crate::services::record_admin_action;
use crate::state::AppState;
use crate::types::{BlacklistAddRequest, MessageResponse};
use crate::validation::ValidateNonEmpty;

/// GET /api/v1/blacklist - Newest entries first
pub async fn list_blacklist(
    State(state): State<AppState>,
    AdminExtractor(_admin): AdminExtractor,
) -> ApiResult<impl IntoResponse> {
    let entries = state.store.blacklist_list().await?;
    Ok(private(entries))
}

/// POST /api/v1/blacklist - Bar a growid
pub async fn add_to_blacklist(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    ValidJson(req): ValidJson<BlacklistAddRequest>,
) -> ApiResult<impl IntoResponse> {
    let growid = req.growid.trim();
    growid.validate_non_empty("growid")?;
    let entry = state
        .store
        .blacklist_add(growid, &admin.growid, req.reason.as_deref())
        .await?;
    tracing::info!(growid = %growid, admin = %admin.growid, "Growid blacklisted");
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "blacklist.add",
        growid,
        req.reason.clone(),
    )
    .await;
    Ok(created(entry))
}

/// DELETE /api/v1/blacklist/:growid
pub async fn remove_from_blacklist(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(growid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.store.blacklist_remove(&growid).await? {
        return Err(ApiError::not_found("blacklist entry", &growid));
    }
    record_admin_action(state.store.as_ref(), &admin, "blacklist.remove", &growid, None).await;
    Ok(private(MessageResponse::new(format!(
        "{} removed from blacklist",
        growid
    ))))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/blacklist", get(list_blacklist).post(add_to_blacklist))
        .route("/blacklist/:growid", delete(remove_from_blacklist))
}
