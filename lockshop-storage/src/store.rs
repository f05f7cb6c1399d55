//! Async record store trait.
//!
//! Every entity service reaches the database through this trait. The API
//! crate provides the PostgreSQL implementation; [`crate::InMemoryStore`]
//! backs tests and local development.

use ::async_trait::async_trait;
use lockshop_core::{
    AdminLog, Balance, BlacklistEntry, ConversionRate, Currency, FeatureFlag, FlagInput,
    NewAdminLog, NewProduct, NewTransaction, Product, ProductUpdate, Setting, SettingCategory,
    SettingInput, StockItem, StockStatus, StoreResult, Transaction, User, UserRole,
    WebCredentials,
};
use serde::{Deserialize, Serialize};

/// Default page size for history listings.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Filter for stock history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFilter {
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub status: Option<StockStatus>,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    DEFAULT_HISTORY_LIMIT
}

impl Default for StockFilter {
    fn default() -> Self {
        Self {
            product_code: None,
            status: None,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Result of a bulk stock insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAddOutcome {
    /// Every submitted item was inserted.
    pub all_ok: bool,
    pub inserted: usize,
}

impl BulkAddOutcome {
    pub fn new(submitted: usize, inserted: usize) -> Self {
        Self {
            all_ok: inserted == submitted,
            inserted,
        }
    }
}

/// Balance before and after an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub old: Balance,
    pub new: Balance,
}

/// Async record store for shop entities.
///
/// Mutations are single atomic steps against the backing store. Lookups
/// return `Ok(None)` for absent rows; mutations of absent rows return
/// `StoreError::NotFound`.
#[async_trait]
pub trait ShopStore: Send + Sync {
    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    /// Get a user by growid.
    async fn user_get(&self, growid: &str) -> StoreResult<Option<User>>;

    /// Get the user a discord account is linked to.
    async fn user_get_by_discord(&self, discord_id: &str) -> StoreResult<Option<User>>;

    /// Get a user by website username.
    async fn user_get_by_web(&self, username: &str) -> StoreResult<Option<User>>;

    /// Create a user with zero balances. Conflict if the growid exists.
    async fn user_create(&self, growid: &str, role: UserRole) -> StoreResult<User>;

    /// Link a discord account to an existing user.
    ///
    /// Linking the same pair again is a no-op. Conflict if the discord id is
    /// already linked to another growid.
    async fn discord_link(&self, discord_id: &str, growid: &str) -> StoreResult<()>;

    /// Activate a web account for a growid.
    ///
    /// An unknown growid is created with empty balances, linked to
    /// `discord_id` when one is given. An existing growid is only activated
    /// when `discord_id` is already linked to it. Conflict if the username is
    /// taken, the discord id belongs to another growid, the growid already
    /// has an active web account, or the growid exists without that link.
    async fn web_account_create(
        &self,
        growid: &str,
        username: &str,
        password_hash: &str,
        role: UserRole,
        discord_id: Option<&str>,
    ) -> StoreResult<User>;

    /// Stored login for a website username.
    async fn web_credentials(&self, username: &str) -> StoreResult<Option<WebCredentials>>;

    /// Replace the stored password hash.
    async fn web_password_update(&self, growid: &str, password_hash: &str) -> StoreResult<()>;

    /// Change a user's role.
    async fn user_set_role(&self, growid: &str, role: UserRole) -> StoreResult<User>;

    // ========================================================================
    // BALANCE AND RATE OPERATIONS
    // ========================================================================

    /// Current balance of a user.
    async fn balance_get(&self, growid: &str) -> StoreResult<Balance>;

    /// Add a signed delta to one currency in a single atomic step.
    ///
    /// Rejected with `InsufficientBalance` and no change when the result
    /// would be negative.
    async fn balance_adjust(
        &self,
        growid: &str,
        currency: Currency,
        delta: i64,
    ) -> StoreResult<BalanceChange>;

    /// Active conversion rates.
    async fn conversion_rates(&self) -> StoreResult<Vec<ConversionRate>>;

    /// Deactivate the current rate for a currency and record a new one.
    async fn conversion_rate_set(
        &self,
        currency: Currency,
        rate: i64,
        updated_by: &str,
    ) -> StoreResult<ConversionRate>;

    // ========================================================================
    // PRODUCT OPERATIONS
    // ========================================================================

    /// Create a product. Conflict if the code exists.
    async fn product_create(&self, product: &NewProduct) -> StoreResult<Product>;

    /// Get a product with its available stock count.
    async fn product_get(&self, code: &str) -> StoreResult<Option<Product>>;

    /// List products ordered by code.
    async fn product_list(&self, include_stock: bool) -> StoreResult<Vec<Product>>;

    /// Apply a partial update.
    async fn product_update(&self, code: &str, update: &ProductUpdate) -> StoreResult<Product>;

    /// Delete a product. Returns whether a row was removed.
    async fn product_delete(&self, code: &str) -> StoreResult<bool>;

    // ========================================================================
    // STOCK OPERATIONS
    // ========================================================================

    /// Add one stock item. Conflict if the content already exists.
    async fn stock_add(
        &self,
        product_code: &str,
        content: &str,
        added_by: &str,
    ) -> StoreResult<StockItem>;

    /// Add many stock items, skipping duplicates.
    async fn stock_bulk_add(
        &self,
        product_code: &str,
        contents: &[String],
        added_by: &str,
    ) -> StoreResult<BulkAddOutcome>;

    /// Oldest available items for a product.
    async fn stock_available(&self, product_code: &str, limit: i64)
        -> StoreResult<Vec<StockItem>>;

    /// Get a stock item by id.
    async fn stock_get(&self, id: i64) -> StoreResult<Option<StockItem>>;

    /// Move a stock item to a new status, recording the buyer on sale.
    async fn stock_update_status(
        &self,
        id: i64,
        status: StockStatus,
        buyer_id: Option<&str>,
    ) -> StoreResult<StockItem>;

    /// Recently changed stock items, newest first.
    async fn stock_history(&self, filter: &StockFilter) -> StoreResult<Vec<StockItem>>;

    // ========================================================================
    // TRANSACTION OPERATIONS
    // ========================================================================

    /// Record a ledger entry.
    async fn transaction_create(&self, tx: &NewTransaction) -> StoreResult<Transaction>;

    /// Ledger entries of a user, newest first.
    async fn transactions_for_user(&self, growid: &str, limit: i64)
        -> StoreResult<Vec<Transaction>>;

    // ========================================================================
    // SETTINGS AND FEATURE FLAGS
    // ========================================================================

    async fn setting_get(
        &self,
        category: SettingCategory,
        key: &str,
    ) -> StoreResult<Option<Setting>>;

    /// Insert or replace a setting keyed by (category, key).
    async fn setting_put(&self, input: &SettingInput) -> StoreResult<Setting>;

    async fn setting_delete(&self, category: SettingCategory, key: &str) -> StoreResult<bool>;

    async fn flag_get(&self, name: &str) -> StoreResult<Option<FeatureFlag>>;

    /// Insert or replace a feature flag keyed by name.
    async fn flag_put(&self, input: &FlagInput) -> StoreResult<FeatureFlag>;

    // ========================================================================
    // BLACKLIST
    // ========================================================================

    /// Bar a growid. Conflict if already listed.
    async fn blacklist_add(
        &self,
        growid: &str,
        added_by: &str,
        reason: Option<&str>,
    ) -> StoreResult<BlacklistEntry>;

    async fn blacklist_remove(&self, growid: &str) -> StoreResult<bool>;

    async fn blacklist_get(&self, growid: &str) -> StoreResult<Option<BlacklistEntry>>;

    /// All entries, newest first.
    async fn blacklist_list(&self) -> StoreResult<Vec<BlacklistEntry>>;

    // ========================================================================
    // AUDIT AND HEALTH
    // ========================================================================

    async fn admin_log_record(&self, entry: &NewAdminLog) -> StoreResult<AdminLog>;

    /// Most recent audit entries, newest first.
    async fn admin_logs_recent(&self, limit: i64) -> StoreResult<Vec<AdminLog>>;

    /// Round trip to the backing store.
    async fn ping(&self) -> StoreResult<()>;
}
