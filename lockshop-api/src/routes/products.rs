//! Product REST API Routes
//!
//! The catalog is public to read. Creating, changing and deleting products
//! and managing their stock requires an admin.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lockshop_core::{NewProduct, ProductUpdate};

use crate::constants::clamp_limit;
use crate::error::{ApiError, ApiResult};
use crate::extractors::ValidJson;
use crate::middleware::AdminExtractor;
use crate::routes::{created, private};
use crate::services::{record_admin_action, stock_service};
use crate::state::AppState;
use crate::types::{
    ListQuery, MessageResponse, ProductListQuery, StockAddRequest, StockBulkRequest,
};
use crate::validation::{HasUpdates, ValidateNonEmpty, ValidateRange};

// ============================================================================
// CATALOG
// ============================================================================

/// GET /api/v1/products - List products, optionally with stock counts
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListQuery>,
) -> ApiResult<impl IntoResponse> {
    let products = state
        .store
        .product_list(params.include_stock.unwrap_or(true))
        .await?;
    Ok(Json(products))
}

/// GET /api/v1/products/:code
pub async fn get_product(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .store
        .product_get(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("product", &code))?;
    Ok(Json(product))
}

/// POST /api/v1/products - Create a product
pub async fn create_product(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    ValidJson(mut req): ValidJson<NewProduct>,
) -> ApiResult<impl IntoResponse> {
    req.code.validate_non_empty("code")?;
    req.name.validate_non_empty("name")?;
    req.price.validate_positive("price")?;
    req.code = req.code.trim().to_string();

    let product = state.store.product_create(&req).await?;
    tracing::info!(code = %product.code, admin = %admin.growid, "Product created");
    record_admin_action(state.store.as_ref(), &admin, "product.create", &product.code, None)
        .await;
    Ok(created(product))
}

/// PATCH /api/v1/products/:code - Partial update
pub async fn update_product(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(code): Path<String>,
    ValidJson(req): ValidJson<ProductUpdate>,
) -> ApiResult<impl IntoResponse> {
    req.validate_has_updates()?;
    if let Some(name) = &req.name {
        name.validate_non_empty("name")?;
    }
    if let Some(price) = req.price {
        price.validate_positive("price")?;
    }

    let product = state.store.product_update(&code, &req).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "product.update",
        &code,
        serde_json::to_string(&req).ok(),
    )
    .await;
    Ok(Json(product))
}

/// DELETE /api/v1/products/:code
pub async fn delete_product(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(code): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.store.product_delete(&code).await? {
        return Err(ApiError::not_found("product", &code));
    }
    tracing::info!(code = %code, admin = %admin.growid, "Product deleted");
    record_admin_action(state.store.as_ref(), &admin, "product.delete", &code, None).await;
    Ok(Json(MessageResponse::new(format!("Product {} deleted", code))))
}

// ============================================================================
// STOCK
// ============================================================================

/// GET /api/v1/products/:code/stock - Oldest available items first
pub async fn list_available_stock(
    State(state): State<AppState>,
    AdminExtractor(_admin): AdminExtractor,
    Path(code): Path<String>,
    Query(params): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let items = state
        .store
        .stock_available(&code, clamp_limit(params.limit))
        .await?;
    Ok(private(items))
}

/// POST /api/v1/products/:code/stock
pub async fn add_stock(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(code): Path<String>,
    ValidJson(req): ValidJson<StockAddRequest>,
) -> ApiResult<impl IntoResponse> {
    let item =
        stock_service::add_stock(state.store.as_ref(), &code, &req.content, &admin.growid).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "stock.add",
        &code,
        Some(format!("stock_id={}", item.id)),
    )
    .await;
    Ok(created(item))
}

/// POST /api/v1/products/:code/stock/bulk - Reports `{all_ok, inserted}`
pub async fn bulk_add_stock(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(code): Path<String>,
    ValidJson(req): ValidJson<StockBulkRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome =
        stock_service::bulk_add_stock(state.store.as_ref(), &code, &req.items, &admin.growid)
            .await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "stock.bulk_add",
        &code,
        Some(format!(
            "submitted={} inserted={}",
            req.items.len(),
            outcome.inserted
        )),
    )
    .await;
    Ok(created(outcome))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:code",
            get(get_product)
                .patch(update_product)
                .delete(delete_product),
        )
        .route(
            "/products/:code/stock",
            get(list_available_stock).post(add_stock),
        )
        .route("/products/:code/stock/bulk", post(bulk_add_stock))
}
