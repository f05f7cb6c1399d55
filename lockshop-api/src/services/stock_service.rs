//! Stock Service
//!
//! Stock intake and status transitions. A sale is a move to `sold` that
//! records the buyer.

use lockshop_core::{StockItem, StockStatus};
use lockshop_storage::{BulkAddOutcome, ShopStore};

use crate::constants::MAX_BULK_STOCK_ITEMS;
use crate::error::{ApiError, ApiResult};
use crate::validation::ValidateNonEmpty;

async fn require_product(store: &dyn ShopStore, code: &str) -> ApiResult<()> {
    if store.product_get(code).await?.is_none() {
        return Err(ApiError::not_found("product", code));
    }
    Ok(())
}

/// Add one stock item to a product.
pub async fn add_stock(
    store: &dyn ShopStore,
    product_code: &str,
    content: &str,
    added_by: &str,
) -> ApiResult<StockItem> {
    content.validate_non_empty("content")?;
    require_product(store, product_code).await?;
    let item = store.stock_add(product_code, content.trim(), added_by).await?;
    tracing::info!(product_code = %product_code, stock_id = item.id, "Stock added");
    Ok(item)
}

/// Add many items; blank lines are dropped and duplicates skipped.
pub async fn bulk_add_stock(
    store: &dyn ShopStore,
    product_code: &str,
    items: &[String],
    added_by: &str,
) -> ApiResult<BulkAddOutcome> {
    if items.len() > MAX_BULK_STOCK_ITEMS {
        return Err(ApiError::invalid_field(
            "items",
            format!("ensure this list has at most {} items", MAX_BULK_STOCK_ITEMS),
        ));
    }
    require_product(store, product_code).await?;

    let contents: Vec<String> = items
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    let mut outcome = store.stock_bulk_add(product_code, &contents, added_by).await?;
    // blank entries count as submitted but never insert
    outcome.all_ok = outcome.all_ok && contents.len() == items.len();

    tracing::info!(
        product_code = %product_code,
        submitted = items.len(),
        inserted = outcome.inserted,
        "Bulk stock add"
    );
    Ok(outcome)
}

/// Move an item to a new status.
///
/// Selling requires a buyer and an available item; a sold item can only be
/// deleted.
pub async fn update_status(
    store: &dyn ShopStore,
    id: i64,
    status: StockStatus,
    buyer_id: Option<&str>,
) -> ApiResult<StockItem> {
    let current = store
        .stock_get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("stock", id))?;

    match (current.status, status) {
        (StockStatus::Available, StockStatus::Sold) => {
            if buyer_id.map_or(true, |b| b.trim().is_empty()) {
                return Err(ApiError::invalid_field(
                    "buyer_id",
                    "buyer_id is required when selling stock",
                ));
            }
        }
        (StockStatus::Sold, StockStatus::Available) | (StockStatus::Sold, StockStatus::Sold) => {
            return Err(ApiError::conflict(format!("Stock {} is already sold", id)));
        }
        (StockStatus::Deleted, next) if next != StockStatus::Deleted => {
            return Err(ApiError::conflict(format!("Stock {} is deleted", id)));
        }
        _ => {}
    }

    let buyer = if status == StockStatus::Sold { buyer_id } else { None };
    let item = store.stock_update_status(id, status, buyer).await?;
    tracing::info!(stock_id = id, status = %status, "Stock status updated");
    Ok(item)
}
