//! Balance Service
//!
//! Balance adjustments with ledger bookkeeping, currency conversion and
//! rate updates.

use lockshop_core::{
    ConversionQuote, ConversionRate, Currency, NewTransaction, Platform, RateTable, Transaction,
    TransactionType,
};
use lockshop_storage::{BalanceChange, ShopStore};

use crate::error::{ApiError, ApiResult};
use crate::validation::{ValidateNonEmpty, ValidateRange};

/// Outcome of an adjustment: the balance move and its ledger row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Adjustment {
    pub change: BalanceChange,
    pub transaction: Transaction,
}

/// Apply a signed delta and record it in the ledger.
///
/// A debit that would leave the balance negative is rejected by the store
/// and nothing is recorded.
pub async fn adjust_balance(
    store: &dyn ShopStore,
    growid: &str,
    currency: Currency,
    amount: i64,
    kind: TransactionType,
    platform: Platform,
) -> ApiResult<Adjustment> {
    if amount == 0 {
        return Err(ApiError::invalid_field("amount", "amount must not be zero"));
    }

    let change = store.balance_adjust(growid, currency, amount).await?;
    let transaction = store
        .transaction_create(&NewTransaction {
            growid: growid.to_string(),
            platform,
            kind,
            currency,
            amount,
            old_balance: Some(change.old.summary()),
            new_balance: Some(change.new.summary()),
            items_count: 0,
            total_price: 0,
        })
        .await?;

    tracing::info!(
        growid = %growid,
        currency = %currency,
        amount,
        transaction_id = transaction.id,
        "Balance adjusted"
    );
    Ok(Adjustment {
        change,
        transaction,
    })
}

/// Record a ledger entry for an existing user.
pub async fn record_transaction(
    store: &dyn ShopStore,
    tx: &NewTransaction,
) -> ApiResult<Transaction> {
    tx.growid.validate_non_empty("growid")?;
    tx.items_count.validate_non_negative("items_count")?;
    tx.total_price.validate_non_negative("total_price")?;
    if store.user_get(&tx.growid).await?.is_none() {
        return Err(ApiError::not_found("user", &tx.growid));
    }
    Ok(store.transaction_create(tx).await?)
}

/// Active rates as a conversion table.
pub async fn rate_table(store: &dyn ShopStore) -> ApiResult<RateTable> {
    Ok(RateTable::from_rates(&store.conversion_rates().await?))
}

/// Quote a conversion under the active rates.
pub async fn convert(
    store: &dyn ShopStore,
    amount: i64,
    from: Currency,
    to: Currency,
) -> ApiResult<ConversionQuote> {
    Ok(rate_table(store).await?.convert(amount, from, to)?)
}

/// Replace the active rate of a lock currency.
pub async fn set_rate(
    store: &dyn ShopStore,
    currency: Currency,
    rate: i64,
    updated_by: &str,
) -> ApiResult<ConversionRate> {
    if !currency.is_lock() {
        return Err(ApiError::bad_request("Rupiah has a fixed rate of 1"));
    }
    rate.validate_positive("rate")?;
    let updated = store.conversion_rate_set(currency, rate, updated_by).await?;
    tracing::info!(currency = %currency, rate, updated_by = %updated_by, "Conversion rate updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use lockshop_core::UserRole;
    use lockshop_storage::InMemoryStore;

    #[tokio::test]
    async fn test_adjust_records_transaction() -> ApiResult<()> {
        let store = InMemoryStore::new();
        store.user_create("STEVE", UserRole::Basic).await?;

        let adjustment = adjust_balance(
            &store,
            "STEVE",
            Currency::Dl,
            5,
            TransactionType::Deposit,
            Platform::Web,
        )
        .await?;
        assert_eq!(adjustment.change.new.dl, 5);
        assert_eq!(adjustment.transaction.details, "deposit 5 dl via web");
        assert_eq!(store.transaction_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_overdraft_rejected_without_change() -> ApiResult<()> {
        let store = InMemoryStore::new();
        store.user_create("STEVE", UserRole::Basic).await?;

        let err = adjust_balance(
            &store,
            "STEVE",
            Currency::Wl,
            -1,
            TransactionType::Withdrawal,
            Platform::Discord,
        )
        .await
        .expect_err("overdraft must fail");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(store.balance_get("STEVE").await?.wl, 0);
        assert_eq!(store.transaction_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_convert_with_seeded_rates() -> ApiResult<()> {
        let store = InMemoryStore::new();
        let quote = convert(&store, 100, Currency::Dl, Currency::Bgl).await?;
        assert_eq!(quote.result, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_update_applies_to_quotes() -> ApiResult<()> {
        let store = InMemoryStore::new();
        set_rate(&store, Currency::Wl, 2_500, "OWNER").await?;
        let quote = convert(&store, 2, Currency::Wl, Currency::Rupiah).await?;
        assert_eq!(quote.result, 5_000);

        let err = set_rate(&store, Currency::Rupiah, 2, "OWNER")
            .await
            .expect_err("rupiah rate is fixed");
        assert_eq!(err.code, ErrorCode::HttpException);
        Ok(())
    }
}
