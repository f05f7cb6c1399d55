//! Feature Flag REST API Routes

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::error::ApiResult;
use crate::extractors::ValidJson;
use crate::middleware::{AdminExtractor, AuthExtractor};
use crate::routes::private;
use crate::services::{record_admin_action, settings_service};
use crate::state::AppState;
use crate::types::{FlagCheckResponse, FlagPutRequest};

/// GET /api/v1/flags/:name
pub async fn get_flag(
    State(state): State<AppState>,
    AuthExtractor(_caller): AuthExtractor,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let flag = settings_service::get_flag(state.store.as_ref(), &name).await?;
    Ok(private(flag))
}

/// PUT /api/v1/flags/:name - Insert or replace
pub async fn put_flag(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(name): Path<String>,
    ValidJson(req): ValidJson<FlagPutRequest>,
) -> ApiResult<impl IntoResponse> {
    let flag = settings_service::put_flag(state.store.as_ref(), &name, req, &admin.growid).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "flag.put",
        &name,
        Some(format!("enabled={}", flag.enabled)),
    )
    .await;
    Ok(private(flag))
}

/// GET /api/v1/flags/:name/check - Evaluate the flag for the caller
pub async fn check_flag(
    State(state): State<AppState>,
    AuthExtractor(caller): AuthExtractor,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let enabled = settings_service::check_flag(state.store.as_ref(), &name, &caller).await?;
    Ok(private(FlagCheckResponse { name, enabled }))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/flags/:name", get(get_flag).put(put_flag))
        .route("/flags/:name/check", get(check_flag))
}
