//! Entity records owned by the record store.

use crate::{Currency, Platform, SettingCategory, StockStatus, Timestamp, TransactionType, UserRole};
use serde::{Deserialize, Serialize};

// ============================================================================
// USERS
// ============================================================================

/// Per-currency balance of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub wl: i64,
    pub dl: i64,
    pub bgl: i64,
    pub rupiah: i64,
}

impl Balance {
    /// Amount held in one currency.
    pub fn get(&self, currency: Currency) -> i64 {
        match currency {
            Currency::Wl => self.wl,
            Currency::Dl => self.dl,
            Currency::Bgl => self.bgl,
            Currency::Rupiah => self.rupiah,
        }
    }

    /// Apply a signed delta to one currency.
    ///
    /// Returns `None` when the result would be negative or overflow.
    pub fn apply(&self, currency: Currency, delta: i64) -> Option<Balance> {
        let next = self.get(currency).checked_add(delta)?;
        if next < 0 {
            return None;
        }
        let mut updated = *self;
        match currency {
            Currency::Wl => updated.wl = next,
            Currency::Dl => updated.dl = next,
            Currency::Bgl => updated.bgl = next,
            Currency::Rupiah => updated.rupiah = next,
        }
        Some(updated)
    }

    /// Compact text form stored in transaction rows.
    pub fn summary(&self) -> String {
        format!(
            "wl={} dl={} bgl={} rupiah={}",
            self.wl, self.dl, self.bgl, self.rupiah
        )
    }
}

/// A shop user, keyed by Growtopia id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub growid: String,
    pub balance: Balance,
    pub website_username: Option<String>,
    pub is_web_active: bool,
    pub role: UserRole,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Stored web login for a user. Never serialized to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebCredentials {
    pub growid: String,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

// ============================================================================
// PRODUCTS AND STOCK
// ============================================================================

/// Product catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub price: i64,
    pub description: Option<String>,
    /// Count of available stock, present on read views that ask for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_available: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Payload for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial product update; unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.price.is_none() && self.description.is_none()
    }
}

/// One deliverable unit of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: i64,
    pub product_code: String,
    pub content: String,
    pub status: StockStatus,
    pub added_by: String,
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub added_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// TRANSACTIONS AND RATES
// ============================================================================

/// Ledger entry to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub growid: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub currency: Currency,
    pub amount: i64,
    #[serde(default)]
    pub old_balance: Option<String>,
    #[serde(default)]
    pub new_balance: Option<String>,
    #[serde(default)]
    pub items_count: i64,
    #[serde(default)]
    pub total_price: i64,
}

impl NewTransaction {
    /// Human-readable description stored with the row.
    pub fn details(&self) -> String {
        format!(
            "{} {} {} via {}",
            self.kind, self.amount, self.currency, self.platform
        )
    }
}

/// Recorded ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub growid: String,
    pub platform: Platform,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub currency: Currency,
    pub amount: i64,
    pub details: String,
    pub old_balance: Option<String>,
    pub new_balance: Option<String>,
    pub items_count: i64,
    pub total_price: i64,
    pub created_at: Timestamp,
}

/// Rupiah value of one unit of a lock currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRate {
    pub id: i64,
    pub currency: Currency,
    pub rate: i64,
    pub is_active: bool,
    pub updated_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// SETTINGS, BLACKLIST, AUDIT
// ============================================================================

/// Free-form setting metadata. Parsed as plain JSON data, never evaluated.
pub type SettingMetadata = serde_json::Map<String, serde_json::Value>;

/// A stored shop setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: i64,
    pub category: SettingCategory,
    pub key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub is_public: bool,
    #[serde(default)]
    pub metadata: SettingMetadata,
    pub updated_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Upsert payload for a setting.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingInput {
    pub category: SettingCategory,
    pub key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub is_public: bool,
    pub metadata: SettingMetadata,
    pub updated_by: String,
}

/// A growid barred from the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub growid: String,
    pub added_by: String,
    pub reason: Option<String>,
    pub added_at: Timestamp,
}

/// Audit record of an administrative action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminLog {
    pub id: i64,
    pub admin_id: String,
    pub platform: Platform,
    pub action: String,
    pub target: Option<String>,
    pub details: Option<String>,
    pub created_at: Timestamp,
}

/// Audit record to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdminLog {
    pub admin_id: String,
    pub platform: Platform,
    pub action: String,
    pub target: Option<String>,
    pub details: Option<String>,
}

impl NewAdminLog {
    pub fn web(admin_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
            platform: Platform::Web,
            action: action.into(),
            target: None,
            details: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_apply_rejects_negative() {
        let balance = Balance {
            wl: 10,
            ..Default::default()
        };
        assert_eq!(balance.apply(Currency::Wl, -11), None);
        let updated = balance.apply(Currency::Wl, -10).expect("exact debit is allowed");
        assert_eq!(updated.wl, 0);
    }

    #[test]
    fn test_balance_apply_rejects_overflow() {
        let balance = Balance {
            bgl: i64::MAX,
            ..Default::default()
        };
        assert_eq!(balance.apply(Currency::Bgl, 1), None);
    }

    #[test]
    fn test_transaction_details_format() {
        let tx = NewTransaction {
            growid: "STEVE".to_string(),
            platform: Platform::Web,
            kind: TransactionType::Deposit,
            currency: Currency::Dl,
            amount: 5,
            old_balance: None,
            new_balance: None,
            items_count: 0,
            total_price: 0,
        };
        assert_eq!(tx.details(), "deposit 5 dl via web");
    }

    #[test]
    fn test_new_transaction_reads_type_field() -> Result<(), serde_json::Error> {
        let tx: NewTransaction = serde_json::from_str(
            r#"{"growid":"A","type":"purchase","currency":"wl","amount":3}"#,
        )?;
        assert_eq!(tx.kind, TransactionType::Purchase);
        assert_eq!(tx.platform, Platform::Discord);
        Ok(())
    }

    #[test]
    fn test_product_update_is_empty() {
        assert!(ProductUpdate::default().is_empty());
        let update = ProductUpdate {
            price: Some(10),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
