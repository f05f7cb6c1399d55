//! Stock REST API Routes (admin only)

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use lockshop_storage::StockFilter;

use crate::constants::MAX_LIST_LIMIT;
use crate::error::{ApiError, ApiResult};
use crate::extractors::ValidJson;
use crate::middleware::AdminExtractor;
use crate::routes::private;
use crate::services::{record_admin_action, stock_service};
use crate::state::AppState;
use crate::types::StockUpdateRequest;

/// GET /api/v1/stock/history - Recently changed items, newest first
pub async fn stock_history(
    State(state): State<AppState>,
    AdminExtractor(_admin): AdminExtractor,
    Query(mut filter): Query<StockFilter>,
) -> ApiResult<impl IntoResponse> {
    filter.limit = filter.limit.clamp(1, MAX_LIST_LIMIT);
    let items = state.store.stock_history(&filter).await?;
    Ok(private(items))
}

/// GET /api/v1/stock/:id
pub async fn get_stock(
    State(state): State<AppState>,
    AdminExtractor(_admin): AdminExtractor,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let item = state
        .store
        .stock_get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("stock", id))?;
    Ok(private(item))
}

/// PATCH /api/v1/stock/:id - Status change; `sold` records the buyer
pub async fn update_stock(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<StockUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = stock_service::update_status(
        state.store.as_ref(),
        id,
        req.status,
        req.buyer_id.as_deref(),
    )
    .await?;

    let details = match &item.buyer_id {
        Some(buyer) => format!("status={} buyer={}", item.status, buyer),
        None => format!("status={}", item.status),
    };
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "stock.update",
        &id.to_string(),
        Some(details),
    )
    .await;
    Ok(private(item))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/stock/history", get(stock_history))
        .route("/stock/:id", get(get_stock).patch(update_stock))
}
