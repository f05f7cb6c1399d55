//! Authentication REST API Routes
//!
//! Registration, login, token refresh and password changes for web
//! accounts. Everything except change-password is public.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};

use crate::error::ApiResult;
use crate::extractors::ValidJson;
use crate::middleware::AuthExtractor;
use crate::routes::{created, private};
use crate::services::account_service;
use crate::state::AppState;
use crate::types::{
    ChangePasswordRequest, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
    UserProfile,
};

/// POST /api/v1/auth/register - Create a web account for a growid
pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = account_service::register(state.store.as_ref(), &state.config, &req).await?;
    Ok(created(UserProfile::from(user)))
}

/// POST /api/v1/auth/login - Exchange credentials for a token pair
pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let response =
        account_service::login(state.store.as_ref(), &state.tokens, &req.username, &req.password)
            .await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/refresh - Exchange a refresh token for a new pair
pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let response =
        account_service::refresh(state.store.as_ref(), &state.tokens, &req.refresh_token).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    AuthExtractor(caller): AuthExtractor,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    account_service::change_password(
        state.store.as_ref(),
        &caller.growid,
        &req.old_password,
        &req.new_password,
    )
    .await?;
    Ok(private(MessageResponse::new("Password updated")))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/change-password", post(change_password))
}
