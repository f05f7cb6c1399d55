//! Settings REST API Routes
//!
//! Admins read and write every setting. Other authenticated callers can
//! read settings marked public.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use lockshop_core::SettingCategory;

use crate::error::ApiResult;
use crate::extractors::ValidJson;
use crate::middleware::{AdminExtractor, AuthExtractor};
use crate::routes::{parse_path, private};
use crate::services::{record_admin_action, settings_service};
use crate::state::AppState;
use crate::types::{MessageResponse, SettingPutRequest};

/// GET /api/v1/settings/:category/:key
pub async fn get_setting(
    State(state): State<AppState>,
    AuthExtractor(caller): AuthExtractor,
    Path((category, key)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let category: SettingCategory = parse_path("category", &category)?;
    let setting =
        settings_service::get_setting(state.store.as_ref(), &caller, category, &key).await?;
    Ok(private(setting))
}

/// PUT /api/v1/settings/:category/:key - Insert or replace
pub async fn put_setting(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path((category, key)): Path<(String, String)>,
    ValidJson(req): ValidJson<SettingPutRequest>,
) -> ApiResult<impl IntoResponse> {
    let category: SettingCategory = parse_path("category", &category)?;
    let setting =
        settings_service::put_setting(state.store.as_ref(), category, &key, req, &admin.growid)
            .await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "setting.put",
        &format!("{}/{}", category, key),
        Some(setting.value.to_string()),
    )
    .await;
    Ok(private(setting))
}

/// DELETE /api/v1/settings/:category/:key
pub async fn delete_setting(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path((category, key)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let category: SettingCategory = parse_path("category", &category)?;
    settings_service::delete_setting(state.store.as_ref(), category, &key).await?;
    let target = format!("{}/{}", category, key);
    record_admin_action(state.store.as_ref(), &admin, "setting.delete", &target, None).await;
    Ok(private(MessageResponse::new(format!("Setting {} deleted", target))))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route(
        "/settings/:category/:key",
        get(get_setting).put(put_setting).delete(delete_setting),
    )
}
