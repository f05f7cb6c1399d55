//! User REST API Routes
//!
//! The caller's own profile, balance and ledger, plus admin lookups and
//! role changes.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};

use crate::constants::clamp_limit;
use crate::error::{ApiError, ApiResult};
use crate::extractors::ValidJson;
use crate::middleware::{AdminExtractor, AuthExtractor};
use crate::routes::private;
use crate::services::record_admin_action;
use crate::state::AppState;
use crate::types::{ListQuery, RoleUpdateRequest, UserProfile};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/users/me - Profile of the authenticated caller
pub async fn get_me(
    State(state): State<AppState>,
    AuthExtractor(caller): AuthExtractor,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .store
        .user_get(&caller.growid)
        .await?
        .ok_or_else(|| ApiError::not_found("user", &caller.growid))?;
    Ok(private(UserProfile::from(user)))
}

/// GET /api/v1/users/me/balance
pub async fn get_my_balance(
    State(state): State<AppState>,
    AuthExtractor(caller): AuthExtractor,
) -> ApiResult<impl IntoResponse> {
    let balance = state.store.balance_get(&caller.growid).await?;
    Ok(private(balance))
}

/// GET /api/v1/users/me/transactions - Newest ledger entries first
pub async fn get_my_transactions(
    State(state): State<AppState>,
    AuthExtractor(caller): AuthExtractor,
    Query(params): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let transactions = state
        .store
        .transactions_for_user(&caller.growid, clamp_limit(params.limit))
        .await?;
    Ok(private(transactions))
}

/// GET /api/v1/users/discord/:discord_id - Admin lookup by linked discord account
pub async fn get_by_discord(
    State(state): State<AppState>,
    AdminExtractor(_admin): AdminExtractor,
    Path(discord_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .store
        .user_get_by_discord(&discord_id)
        .await?
        .ok_or_else(|| ApiError::not_found("discord link", &discord_id))?;
    Ok(private(UserProfile::from(user)))
}

/// PUT /api/v1/users/:growid/role
pub async fn update_role(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(growid): Path<String>,
    ValidJson(req): ValidJson<RoleUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.store.user_set_role(&growid, req.role).await?;
    tracing::info!(growid = %growid, role = %user.role, admin = %admin.growid, "Role updated");
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "user.role",
        &growid,
        Some(format!("role={}", user.role)),
    )
    .await;
    Ok(private(UserProfile::from(user)))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/me/balance", get(get_my_balance))
        .route("/users/me/transactions", get(get_my_transactions))
        .route("/users/discord/:discord_id", get(get_by_discord))
        .route("/users/:growid/role", put(update_role))
}
