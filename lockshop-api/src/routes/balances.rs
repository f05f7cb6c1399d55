//! Balance, Transaction and Conversion Rate Routes
//!
//! Rates and conversion quotes are public. Ledger writes, balance
//! adjustments and rate changes require an admin.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use lockshop_core::{Currency, NewTransaction, Platform};

use crate::error::ApiResult;
use crate::extractors::ValidJson;
use crate::middleware::AdminExtractor;
use crate::routes::{created, parse_path, private};
use crate::services::{balance_service, record_admin_action};
use crate::state::AppState;
use crate::types::{BalanceAdjustRequest, ConvertRequest, RateUpdateRequest};
use crate::validation::ValidateRange;

// ============================================================================
// LEDGER AND BALANCES
// ============================================================================

/// POST /api/v1/transactions - Record a ledger entry
pub async fn create_transaction(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    ValidJson(req): ValidJson<NewTransaction>,
) -> ApiResult<impl IntoResponse> {
    let transaction = balance_service::record_transaction(state.store.as_ref(), &req).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "transaction.create",
        &req.growid,
        Some(transaction.details.clone()),
    )
    .await;
    Ok(created(transaction))
}

/// POST /api/v1/balances/:growid/adjust - Signed delta plus ledger entry
pub async fn adjust_balance(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(growid): Path<String>,
    ValidJson(req): ValidJson<BalanceAdjustRequest>,
) -> ApiResult<impl IntoResponse> {
    let adjustment = balance_service::adjust_balance(
        state.store.as_ref(),
        &growid,
        req.currency,
        req.amount,
        req.kind,
        Platform::Web,
    )
    .await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "balance.adjust",
        &growid,
        Some(adjustment.transaction.details.clone()),
    )
    .await;
    Ok(private(adjustment))
}

// ============================================================================
// CONVERSION RATES
// ============================================================================

/// GET /api/v1/rates - Active rates
pub async fn list_rates(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let rates = state.store.conversion_rates().await?;
    Ok(Json(rates))
}

/// POST /api/v1/rates/convert - Quote a conversion under active rates
pub async fn convert(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ConvertRequest>,
) -> ApiResult<impl IntoResponse> {
    req.amount.validate_non_negative("amount")?;
    let quote = balance_service::convert(state.store.as_ref(), req.amount, req.from, req.to).await?;
    Ok(Json(quote))
}

/// PUT /api/v1/rates/:currency - Replace the active rate
pub async fn update_rate(
    State(state): State<AppState>,
    AdminExtractor(admin): AdminExtractor,
    Path(currency): Path<String>,
    ValidJson(req): ValidJson<RateUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let currency: Currency = parse_path("currency", &currency)?;
    let rate =
        balance_service::set_rate(state.store.as_ref(), currency, req.rate, &admin.growid).await?;
    record_admin_action(
        state.store.as_ref(),
        &admin,
        "rate.update",
        currency.as_db_str(),
        Some(format!("rate={}", rate.rate)),
    )
    .await;
    Ok(private(rate))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/transactions", post(create_transaction))
        .route("/balances/:growid/adjust", post(adjust_balance))
        .route("/rates", get(list_rates))
        .route("/rates/convert", post(convert))
        .route("/rates/:currency", put(update_rate))
}
