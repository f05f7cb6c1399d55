//! In-memory record store for tests and local development.

use crate::store::{BalanceChange, BulkAddOutcome, ShopStore, StockFilter};
use ::async_trait::async_trait;
use chrono::Utc;
use lockshop_core::{
    AdminLog, Balance, BlacklistEntry, ConversionRate, Currency, FeatureFlag, FlagInput,
    NewAdminLog, NewProduct, NewTransaction, Product, ProductUpdate, Setting, SettingCategory,
    SettingInput, StockItem, StockStatus, StoreError, StoreResult, Transaction, User, UserRole,
    WebCredentials,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    /// growid -> password hash
    passwords: HashMap<String, String>,
    discord_links: HashMap<String, String>,
    products: BTreeMap<String, Product>,
    stock: BTreeMap<i64, StockItem>,
    transactions: Vec<Transaction>,
    rates: Vec<ConversionRate>,
    settings: HashMap<(SettingCategory, String), Setting>,
    flags: HashMap<String, FeatureFlag>,
    blacklist: HashMap<String, BlacklistEntry>,
    admin_logs: Vec<AdminLog>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn available_count(&self, code: &str) -> i64 {
        self.stock
            .values()
            .filter(|s| s.product_code == code && s.status == StockStatus::Available)
            .count() as i64
    }

    fn with_stock(&self, product: &Product) -> Product {
        Product {
            stock_available: Some(self.available_count(&product.code)),
            ..product.clone()
        }
    }

    fn insert_stock(&mut self, product_code: &str, content: &str, added_by: &str) -> StoreResult<StockItem> {
        if !self.products.contains_key(product_code) {
            return Err(StoreError::not_found("product", product_code));
        }
        if self.stock.values().any(|s| s.content == content) {
            return Err(StoreError::conflict("stock", "content already exists"));
        }
        let now = Utc::now();
        let item = StockItem {
            id: self.next_id(),
            product_code: product_code.to_string(),
            content: content.to_string(),
            status: StockStatus::Available,
            added_by: added_by.to_string(),
            buyer_id: None,
            seller_id: None,
            added_at: now,
            updated_at: now,
        };
        self.stock.insert(item.id, item.clone());
        Ok(item)
    }
}

/// Record store holding every table in process memory.
///
/// All tables sit behind one async lock so multi-table mutations stay atomic.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store seeded with the default conversion rates.
    pub fn new() -> Self {
        let mut tables = Tables::default();
        let now = Utc::now();
        for currency in Currency::LOCKS {
            let id = tables.next_id();
            tables.rates.push(ConversionRate {
                id,
                currency,
                rate: currency.default_rate(),
                is_active: true,
                updated_by: "system".to_string(),
                created_at: now,
                updated_at: now,
            });
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    /// Number of recorded transactions.
    pub async fn transaction_count(&self) -> usize {
        self.tables.read().await.transactions.len()
    }
}

fn new_user(growid: &str, role: UserRole) -> User {
    let now = Utc::now();
    User {
        growid: growid.to_string(),
        balance: Balance::default(),
        website_username: None,
        is_web_active: false,
        role,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl ShopStore for InMemoryStore {
    // === Users ===

    async fn user_get(&self, growid: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(growid).cloned())
    }

    async fn user_get_by_discord(&self, discord_id: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .discord_links
            .get(discord_id)
            .and_then(|growid| tables.users.get(growid))
            .cloned())
    }

    async fn user_get_by_web(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.website_username.as_deref() == Some(username))
            .cloned())
    }

    async fn user_create(&self, growid: &str, role: UserRole) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(growid) {
            return Err(StoreError::conflict("user", format!("{} already exists", growid)));
        }
        let user = new_user(growid, role);
        tables.users.insert(growid.to_string(), user.clone());
        Ok(user)
    }

    async fn discord_link(&self, discord_id: &str, growid: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(growid) {
            return Err(StoreError::not_found("user", growid));
        }
        match tables.discord_links.get(discord_id).cloned() {
            Some(linked) if linked != growid => {
                Err(StoreError::conflict("discord link", "discord id already linked"))
            }
            Some(_) => Ok(()),
            None => {
                tables
                    .discord_links
                    .insert(discord_id.to_string(), growid.to_string());
                Ok(())
            }
        }
    }

    async fn web_account_create(
        &self,
        growid: &str,
        username: &str,
        password_hash: &str,
        role: UserRole,
        discord_id: Option<&str>,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .users
            .values()
            .any(|u| u.website_username.as_deref() == Some(username));
        if taken {
            return Err(StoreError::conflict("user", "username already taken"));
        }

        let linked = discord_id.and_then(|d| tables.discord_links.get(d).cloned());
        if linked.as_deref().is_some_and(|g| g != growid) {
            return Err(StoreError::conflict("discord link", "discord id already linked"));
        }

        let mut user = match tables.users.get(growid) {
            Some(existing) if existing.is_web_active => {
                return Err(StoreError::conflict("user", "web account already active"));
            }
            // Adopting an existing growid requires its discord link
            Some(_) if linked.is_none() => {
                return Err(StoreError::conflict("user", "growid already registered"));
            }
            Some(existing) => existing.clone(),
            None => new_user(growid, role),
        };
        user.website_username = Some(username.to_string());
        user.is_web_active = true;
        user.updated_at = Utc::now();

        if let (Some(discord_id), None) = (discord_id, linked) {
            tables
                .discord_links
                .insert(discord_id.to_string(), growid.to_string());
        }
        tables.users.insert(growid.to_string(), user.clone());
        tables
            .passwords
            .insert(growid.to_string(), password_hash.to_string());
        Ok(user)
    }

    async fn web_credentials(&self, username: &str) -> StoreResult<Option<WebCredentials>> {
        let tables = self.tables.read().await;
        let Some(user) = tables
            .users
            .values()
            .find(|u| u.website_username.as_deref() == Some(username))
        else {
            return Ok(None);
        };
        Ok(tables.passwords.get(&user.growid).map(|hash| WebCredentials {
            growid: user.growid.clone(),
            username: username.to_string(),
            password_hash: hash.clone(),
            role: user.role,
        }))
    }

    async fn web_password_update(&self, growid: &str, password_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(growid)
            .ok_or_else(|| StoreError::not_found("user", growid))?;
        user.updated_at = Utc::now();
        tables
            .passwords
            .insert(growid.to_string(), password_hash.to_string());
        Ok(())
    }

    async fn user_set_role(&self, growid: &str, role: UserRole) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(growid)
            .ok_or_else(|| StoreError::not_found("user", growid))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    // === Balances and rates ===

    async fn balance_get(&self, growid: &str) -> StoreResult<Balance> {
        self.tables
            .read()
            .await
            .users
            .get(growid)
            .map(|u| u.balance)
            .ok_or_else(|| StoreError::not_found("user", growid))
    }

    async fn balance_adjust(
        &self,
        growid: &str,
        currency: Currency,
        delta: i64,
    ) -> StoreResult<BalanceChange> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(growid)
            .ok_or_else(|| StoreError::not_found("user", growid))?;
        let old = user.balance;
        let new = old
            .apply(currency, delta)
            .ok_or_else(|| StoreError::InsufficientBalance {
                growid: growid.to_string(),
                currency: currency.to_string(),
            })?;
        user.balance = new;
        user.updated_at = Utc::now();
        Ok(BalanceChange { old, new })
    }

    async fn conversion_rates(&self) -> StoreResult<Vec<ConversionRate>> {
        let tables = self.tables.read().await;
        Ok(tables.rates.iter().filter(|r| r.is_active).cloned().collect())
    }

    async fn conversion_rate_set(
        &self,
        currency: Currency,
        rate: i64,
        updated_by: &str,
    ) -> StoreResult<ConversionRate> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        for existing in tables
            .rates
            .iter_mut()
            .filter(|r| r.currency == currency && r.is_active)
        {
            existing.is_active = false;
            existing.updated_at = now;
        }
        let row = ConversionRate {
            id: tables.next_id(),
            currency,
            rate,
            is_active: true,
            updated_by: updated_by.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.rates.push(row.clone());
        Ok(row)
    }

    // === Products ===

    async fn product_create(&self, product: &NewProduct) -> StoreResult<Product> {
        let mut tables = self.tables.write().await;
        if tables.products.contains_key(&product.code) {
            return Err(StoreError::conflict(
                "product",
                format!("{} already exists", product.code),
            ));
        }
        let now = Utc::now();
        let row = Product {
            code: product.code.clone(),
            name: product.name.clone(),
            price: product.price,
            description: product.description.clone(),
            stock_available: None,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(row.code.clone(), row.clone());
        Ok(row)
    }

    async fn product_get(&self, code: &str) -> StoreResult<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.get(code).map(|p| tables.with_stock(p)))
    }

    async fn product_list(&self, include_stock: bool) -> StoreResult<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .map(|p| {
                if include_stock {
                    tables.with_stock(p)
                } else {
                    p.clone()
                }
            })
            .collect())
    }

    async fn product_update(&self, code: &str, update: &ProductUpdate) -> StoreResult<Product> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(code)
            .ok_or_else(|| StoreError::not_found("product", code))?;
        if let Some(name) = &update.name {
            product.name = name.clone();
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(description) = &update.description {
            product.description = Some(description.clone());
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn product_delete(&self, code: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.products.remove(code).is_some();
        if removed {
            tables.stock.retain(|_, s| s.product_code != code);
        }
        Ok(removed)
    }

    // === Stock ===

    async fn stock_add(
        &self,
        product_code: &str,
        content: &str,
        added_by: &str,
    ) -> StoreResult<StockItem> {
        self.tables
            .write()
            .await
            .insert_stock(product_code, content, added_by)
    }

    async fn stock_bulk_add(
        &self,
        product_code: &str,
        contents: &[String],
        added_by: &str,
    ) -> StoreResult<BulkAddOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(product_code) {
            return Err(StoreError::not_found("product", product_code));
        }
        let mut inserted = 0;
        for content in contents {
            match tables.insert_stock(product_code, content, added_by) {
                Ok(_) => inserted += 1,
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(BulkAddOutcome::new(contents.len(), inserted))
    }

    async fn stock_available(
        &self,
        product_code: &str,
        limit: i64,
    ) -> StoreResult<Vec<StockItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<StockItem> = tables
            .stock
            .values()
            .filter(|s| s.product_code == product_code && s.status == StockStatus::Available)
            .cloned()
            .collect();
        items.sort_by_key(|s| (s.added_at, s.id));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn stock_get(&self, id: i64) -> StoreResult<Option<StockItem>> {
        Ok(self.tables.read().await.stock.get(&id).cloned())
    }

    async fn stock_update_status(
        &self,
        id: i64,
        status: StockStatus,
        buyer_id: Option<&str>,
    ) -> StoreResult<StockItem> {
        let mut tables = self.tables.write().await;
        let item = tables
            .stock
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("stock", id))?;
        item.status = status;
        if let Some(buyer) = buyer_id {
            item.buyer_id = Some(buyer.to_string());
        }
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn stock_history(&self, filter: &StockFilter) -> StoreResult<Vec<StockItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<StockItem> = tables
            .stock
            .values()
            .filter(|s| {
                filter
                    .product_code
                    .as_deref()
                    .map_or(true, |code| s.product_code == code)
            })
            .filter(|s| filter.status.map_or(true, |status| s.status == status))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        items.truncate(filter.limit.max(0) as usize);
        Ok(items)
    }

    // === Transactions ===

    async fn transaction_create(&self, tx: &NewTransaction) -> StoreResult<Transaction> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&tx.growid) {
            return Err(StoreError::not_found("user", &tx.growid));
        }
        let row = Transaction {
            id: tables.next_id(),
            growid: tx.growid.clone(),
            platform: tx.platform,
            kind: tx.kind,
            currency: tx.currency,
            amount: tx.amount,
            details: tx.details(),
            old_balance: tx.old_balance.clone(),
            new_balance: tx.new_balance.clone(),
            items_count: tx.items_count,
            total_price: tx.total_price,
            created_at: Utc::now(),
        };
        tables.transactions.push(row.clone());
        Ok(row)
    }

    async fn transactions_for_user(
        &self,
        growid: &str,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .rev()
            .filter(|t| t.growid == growid)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    // === Settings and flags ===

    async fn setting_get(
        &self,
        category: SettingCategory,
        key: &str,
    ) -> StoreResult<Option<Setting>> {
        let tables = self.tables.read().await;
        Ok(tables.settings.get(&(category, key.to_string())).cloned())
    }

    async fn setting_put(&self, input: &SettingInput) -> StoreResult<Setting> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let map_key = (input.category, input.key.clone());
        let existing = tables
            .settings
            .get(&map_key)
            .map(|s| (s.id, s.created_at));
        let (id, created_at) = match existing {
            Some(kept) => kept,
            None => (tables.next_id(), now),
        };
        let setting = Setting {
            id,
            category: input.category,
            key: input.key.clone(),
            value: input.value.clone(),
            description: input.description.clone(),
            is_public: input.is_public,
            metadata: input.metadata.clone(),
            updated_by: input.updated_by.clone(),
            created_at,
            updated_at: now,
        };
        tables.settings.insert(map_key, setting.clone());
        Ok(setting)
    }

    async fn setting_delete(&self, category: SettingCategory, key: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.settings.remove(&(category, key.to_string())).is_some())
    }

    async fn flag_get(&self, name: &str) -> StoreResult<Option<FeatureFlag>> {
        Ok(self.tables.read().await.flags.get(name).cloned())
    }

    async fn flag_put(&self, input: &FlagInput) -> StoreResult<FeatureFlag> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let created_at = tables
            .flags
            .get(&input.name)
            .map_or(now, |existing| existing.created_at);
        let flag = FeatureFlag {
            name: input.name.clone(),
            description: input.description.clone(),
            enabled: input.enabled,
            conditions: input.conditions.clone(),
            updated_by: input.updated_by.clone(),
            created_at,
            updated_at: now,
        };
        tables.flags.insert(flag.name.clone(), flag.clone());
        Ok(flag)
    }

    // === Blacklist ===

    async fn blacklist_add(
        &self,
        growid: &str,
        added_by: &str,
        reason: Option<&str>,
    ) -> StoreResult<BlacklistEntry> {
        let mut tables = self.tables.write().await;
        if tables.blacklist.contains_key(growid) {
            return Err(StoreError::conflict("blacklist", format!("{} already listed", growid)));
        }
        let entry = BlacklistEntry {
            growid: growid.to_string(),
            added_by: added_by.to_string(),
            reason: reason.map(str::to_string),
            added_at: Utc::now(),
        };
        tables.blacklist.insert(growid.to_string(), entry.clone());
        Ok(entry)
    }

    async fn blacklist_remove(&self, growid: &str) -> StoreResult<bool> {
        Ok(self.tables.write().await.blacklist.remove(growid).is_some())
    }

    async fn blacklist_get(&self, growid: &str) -> StoreResult<Option<BlacklistEntry>> {
        Ok(self.tables.read().await.blacklist.get(growid).cloned())
    }

    async fn blacklist_list(&self) -> StoreResult<Vec<BlacklistEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<BlacklistEntry> = tables.blacklist.values().cloned().collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(entries)
    }

    // === Audit ===

    async fn admin_log_record(&self, entry: &NewAdminLog) -> StoreResult<AdminLog> {
        let mut tables = self.tables.write().await;
        let row = AdminLog {
            id: tables.next_id(),
            admin_id: entry.admin_id.clone(),
            platform: entry.platform,
            action: entry.action.clone(),
            target: entry.target.clone(),
            details: entry.details.clone(),
            created_at: Utc::now(),
        };
        tables.admin_logs.push(row.clone());
        Ok(row)
    }

    async fn admin_logs_recent(&self, limit: i64) -> StoreResult<Vec<AdminLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admin_logs
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
