//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, the [`PgStore`]
//! implementation of [`ShopStore`], and the PostgreSQL backends for
//! rate-limit counters and cached responses.
//!
//! Every query is parameterized. The only interpolated SQL fragments are
//! balance column names from [`Currency::balance_column`], which are static.

use std::time::Duration;

use ::async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use lockshop_core::{
    AdminLog, Balance, BlacklistEntry, ConversionRate, Currency, EnumParseError, FeatureFlag,
    FlagConditions, FlagInput, NewAdminLog, NewProduct, NewTransaction, Product, ProductUpdate,
    Setting, SettingCategory, SettingInput, StockItem, StockStatus, StoreError, StoreResult,
    Transaction, User, UserRole, WebCredentials,
};
use lockshop_storage::{
    glob_to_like, BackendError, BackendResult, BalanceChange, BulkAddOutcome, CacheBackend,
    CachedResponse, CounterHit, CounterStore, ShopStore, StockFilter,
};
use serde_json::Value as JsonValue;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::FromSql;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Bound on pool waits and on every statement
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "lockshop".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("LOCKSHOP_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("LOCKSHOP_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("LOCKSHOP_DB_NAME").unwrap_or_else(|_| "lockshop".to_string()),
            user: std::env::var("LOCKSHOP_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("LOCKSHOP_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("LOCKSHOP_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("LOCKSHOP_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.options = Some(format!(
            "-c statement_timeout={}",
            self.timeout.as_millis()
        ));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..PoolConfig::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            tracing::error!(error = %e, "Failed to create database pool");
            ApiError::database_error()
        })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    growid          TEXT PRIMARY KEY,
    balance_wl      BIGINT NOT NULL DEFAULT 0,
    balance_dl      BIGINT NOT NULL DEFAULT 0,
    balance_bgl     BIGINT NOT NULL DEFAULT 0,
    balance_rupiah  BIGINT NOT NULL DEFAULT 0,
    website_username TEXT UNIQUE,
    password_hash   TEXT,
    is_web_active   BOOLEAN NOT NULL DEFAULT FALSE,
    role            TEXT NOT NULL DEFAULT 'basic',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS discord_links (
    discord_id  TEXT PRIMARY KEY,
    growid      TEXT NOT NULL REFERENCES users(growid) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS products (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    price       BIGINT NOT NULL,
    description TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS stock (
    id           BIGSERIAL PRIMARY KEY,
    product_code TEXT NOT NULL REFERENCES products(code) ON DELETE CASCADE,
    content      TEXT NOT NULL UNIQUE,
    status       TEXT NOT NULL DEFAULT 'available',
    added_by     TEXT NOT NULL,
    buyer_id     TEXT,
    seller_id    TEXT,
    added_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_stock_product_status ON stock (product_code, status);

CREATE TABLE IF NOT EXISTS transactions (
    id          BIGSERIAL PRIMARY KEY,
    growid      TEXT NOT NULL REFERENCES users(growid),
    platform    TEXT NOT NULL,
    type        TEXT NOT NULL,
    currency    TEXT NOT NULL,
    amount      BIGINT NOT NULL,
    details     TEXT NOT NULL,
    old_balance TEXT,
    new_balance TEXT,
    items_count BIGINT NOT NULL DEFAULT 0,
    total_price BIGINT NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_transactions_growid ON transactions (growid, created_at DESC);

CREATE TABLE IF NOT EXISTS conversion_rates (
    id          BIGSERIAL PRIMARY KEY,
    currency    TEXT NOT NULL,
    rate        BIGINT NOT NULL,
    is_active   BOOLEAN NOT NULL DEFAULT TRUE,
    updated_by  TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_rates_active ON conversion_rates (currency) WHERE is_active;

CREATE TABLE IF NOT EXISTS settings (
    id          BIGSERIAL PRIMARY KEY,
    category    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       JSONB NOT NULL,
    description TEXT,
    is_public   BOOLEAN NOT NULL DEFAULT FALSE,
    metadata    JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_by  TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (category, key)
);

CREATE TABLE IF NOT EXISTS feature_flags (
    name        TEXT PRIMARY KEY,
    description TEXT,
    enabled     BOOLEAN NOT NULL DEFAULT FALSE,
    conditions  JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_by  TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS blacklist (
    growid      TEXT PRIMARY KEY,
    added_by    TEXT NOT NULL,
    reason      TEXT,
    added_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS admin_logs (
    id          BIGSERIAL PRIMARY KEY,
    admin_id    TEXT NOT NULL,
    platform    TEXT NOT NULL,
    action      TEXT NOT NULL,
    target      TEXT,
    details     TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS rate_limit_counters (
    key         TEXT PRIMARY KEY,
    count       BIGINT NOT NULL,
    expires_at  TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    value       JSONB NOT NULL,
    expires_at  TIMESTAMPTZ NOT NULL
);
"#;

const SEED_RATE: &str = "INSERT INTO conversion_rates (currency, rate, is_active, updated_by) \
     SELECT $1::text, $2::bigint, TRUE, 'system' \
     WHERE NOT EXISTS (SELECT 1 FROM conversion_rates WHERE currency = $1::text AND is_active)";

/// Create every table idempotently and seed the default conversion rates.
pub async fn ensure_schema(pool: &Pool) -> ApiResult<()> {
    let conn = pool.get().await?;
    conn.batch_execute(SCHEMA).await?;
    for currency in Currency::LOCKS {
        conn.execute(SEED_RATE, &[&currency.as_db_str(), &currency.default_rate()])
            .await?;
    }
    tracing::info!("Database schema ready");
    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn store_err(err: tokio_postgres::Error) -> StoreError {
    match err.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
            StoreError::conflict("record", "duplicate key")
        }
        Some(code) if *code == SqlState::QUERY_CANCELED => {
            tracing::error!(error = %err, "Statement timed out");
            StoreError::Timeout
        }
        _ => StoreError::backend(err.to_string()),
    }
}

fn pool_err(err: PoolError) -> StoreError {
    match err {
        PoolError::Timeout(_) => StoreError::Timeout,
        other => StoreError::backend(other.to_string()),
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn col<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> StoreResult<T> {
    row.try_get(name).map_err(store_err)
}

fn enum_col<T>(row: &Row, name: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = EnumParseError>,
{
    let raw: String = col(row, name)?;
    raw.parse().map_err(|e: EnumParseError| StoreError::InvalidData {
        reason: e.to_string(),
    })
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row, name: &str) -> StoreResult<T> {
    let raw: JsonValue = col(row, name)?;
    serde_json::from_value(raw).map_err(|e| StoreError::InvalidData {
        reason: format!("{}: {}", name, e),
    })
}

const USER_COLUMNS: &str = "growid, balance_wl, balance_dl, balance_bgl, balance_rupiah, \
     website_username, is_web_active, role, created_at, updated_at";

fn balance_from_row(row: &Row) -> StoreResult<Balance> {
    Ok(Balance {
        wl: col(row, "balance_wl")?,
        dl: col(row, "balance_dl")?,
        bgl: col(row, "balance_bgl")?,
        rupiah: col(row, "balance_rupiah")?,
    })
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        growid: col(row, "growid")?,
        balance: balance_from_row(row)?,
        website_username: col(row, "website_username")?,
        is_web_active: col(row, "is_web_active")?,
        role: enum_col(row, "role")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

const PRODUCT_COLUMNS: &str = "p.code, p.name, p.price, p.description, p.created_at, p.updated_at";

fn product_from_row(row: &Row, with_stock: bool) -> StoreResult<Product> {
    Ok(Product {
        code: col(row, "code")?,
        name: col(row, "name")?,
        price: col(row, "price")?,
        description: col(row, "description")?,
        stock_available: if with_stock {
            Some(col(row, "stock_available")?)
        } else {
            None
        },
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

const STOCK_COLUMNS: &str =
    "id, product_code, content, status, added_by, buyer_id, seller_id, added_at, updated_at";

fn stock_from_row(row: &Row) -> StoreResult<StockItem> {
    Ok(StockItem {
        id: col(row, "id")?,
        product_code: col(row, "product_code")?,
        content: col(row, "content")?,
        status: enum_col(row, "status")?,
        added_by: col(row, "added_by")?,
        buyer_id: col(row, "buyer_id")?,
        seller_id: col(row, "seller_id")?,
        added_at: col(row, "added_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, growid, platform, type, currency, amount, details, \
     old_balance, new_balance, items_count, total_price, created_at";

fn transaction_from_row(row: &Row) -> StoreResult<Transaction> {
    Ok(Transaction {
        id: col(row, "id")?,
        growid: col(row, "growid")?,
        platform: enum_col(row, "platform")?,
        kind: enum_col(row, "type")?,
        currency: enum_col(row, "currency")?,
        amount: col(row, "amount")?,
        details: col(row, "details")?,
        old_balance: col(row, "old_balance")?,
        new_balance: col(row, "new_balance")?,
        items_count: col(row, "items_count")?,
        total_price: col(row, "total_price")?,
        created_at: col(row, "created_at")?,
    })
}

const RATE_COLUMNS: &str = "id, currency, rate, is_active, updated_by, created_at, updated_at";

fn rate_from_row(row: &Row) -> StoreResult<ConversionRate> {
    Ok(ConversionRate {
        id: col(row, "id")?,
        currency: enum_col(row, "currency")?,
        rate: col(row, "rate")?,
        is_active: col(row, "is_active")?,
        updated_by: col(row, "updated_by")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

const SETTING_COLUMNS: &str = "id, category, key, value, description, is_public, metadata, \
     updated_by, created_at, updated_at";

fn setting_from_row(row: &Row) -> StoreResult<Setting> {
    Ok(Setting {
        id: col(row, "id")?,
        category: enum_col(row, "category")?,
        key: col(row, "key")?,
        value: col(row, "value")?,
        description: col(row, "description")?,
        is_public: col(row, "is_public")?,
        metadata: json_col(row, "metadata")?,
        updated_by: col(row, "updated_by")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

const FLAG_COLUMNS: &str =
    "name, description, enabled, conditions, updated_by, created_at, updated_at";

fn flag_from_row(row: &Row) -> StoreResult<FeatureFlag> {
    Ok(FeatureFlag {
        name: col(row, "name")?,
        description: col(row, "description")?,
        enabled: col(row, "enabled")?,
        conditions: json_col::<FlagConditions>(row, "conditions")?,
        updated_by: col(row, "updated_by")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn blacklist_from_row(row: &Row) -> StoreResult<BlacklistEntry> {
    Ok(BlacklistEntry {
        growid: col(row, "growid")?,
        added_by: col(row, "added_by")?,
        reason: col(row, "reason")?,
        added_at: col(row, "added_at")?,
    })
}

fn admin_log_from_row(row: &Row) -> StoreResult<AdminLog> {
    Ok(AdminLog {
        id: col(row, "id")?,
        admin_id: col(row, "admin_id")?,
        platform: enum_col(row, "platform")?,
        action: col(row, "action")?,
        target: col(row, "target")?,
        details: col(row, "details")?,
        created_at: col(row, "created_at")?,
    })
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// [`ShopStore`] over a pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_size", &self.pool.status().size)
            .finish()
    }
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Pool from configuration, with the schema ensured.
    pub async fn connect(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    async fn user_exists(&self, growid: &str) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT 1 FROM users WHERE growid = $1", &[&growid])
            .await
            .map_err(store_err)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ShopStore for PgStore {
    // === Users ===

    async fn user_get(&self, growid: &str) -> StoreResult<Option<User>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM users WHERE growid = $1", USER_COLUMNS);
        conn.query_opt(&sql, &[&growid])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn user_get_by_discord(&self, discord_id: &str) -> StoreResult<Option<User>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM users WHERE growid = \
             (SELECT growid FROM discord_links WHERE discord_id = $1)",
            USER_COLUMNS
        );
        conn.query_opt(&sql, &[&discord_id])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn user_get_by_web(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM users WHERE website_username = $1", USER_COLUMNS);
        conn.query_opt(&sql, &[&username])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn user_create(&self, growid: &str, role: UserRole) -> StoreResult<User> {
        let conn = self.conn().await?;
        let sql = format!(
            "INSERT INTO users (growid, role) VALUES ($1, $2) RETURNING {}",
            USER_COLUMNS
        );
        match conn.query_one(&sql, &[&growid, &role.as_db_str()]).await {
            Ok(row) => user_from_row(&row),
            Err(e) if is_unique_violation(&e) => Err(StoreError::conflict(
                "user",
                format!("{} already exists", growid),
            )),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn discord_link(&self, discord_id: &str, growid: &str) -> StoreResult<()> {
        if !self.user_exists(growid).await? {
            return Err(StoreError::not_found("user", growid));
        }
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO discord_links (discord_id, growid) VALUES ($1, $2) \
             ON CONFLICT (discord_id) DO NOTHING",
            &[&discord_id, &growid],
        )
        .await
        .map_err(store_err)?;

        let row = conn
            .query_one(
                "SELECT growid FROM discord_links WHERE discord_id = $1",
                &[&discord_id],
            )
            .await
            .map_err(store_err)?;
        let linked: String = col(&row, "growid")?;
        if linked != growid {
            return Err(StoreError::conflict("discord link", "discord id already linked"));
        }
        Ok(())
    }

    async fn web_account_create(
        &self,
        growid: &str,
        username: &str,
        password_hash: &str,
        role: UserRole,
        discord_id: Option<&str>,
    ) -> StoreResult<User> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(store_err)?;

        let linked: Option<String> = match discord_id {
            Some(discord_id) => tx
                .query_opt(
                    "SELECT growid FROM discord_links WHERE discord_id = $1 FOR UPDATE",
                    &[&discord_id],
                )
                .await
                .map_err(store_err)?
                .map(|row| col(&row, "growid"))
                .transpose()?,
            None => None,
        };
        if linked.as_deref().is_some_and(|g| g != growid) {
            return Err(StoreError::conflict("discord link", "discord id already linked"));
        }

        let existing = tx
            .query_opt(
                "SELECT is_web_active FROM users WHERE growid = $1 FOR UPDATE",
                &[&growid],
            )
            .await
            .map_err(store_err)?;

        let result = match existing {
            Some(row) => {
                let active: bool = col(&row, "is_web_active")?;
                if active {
                    return Err(StoreError::conflict("user", "web account already active"));
                }
                // Adopting an existing growid requires its discord link
                if linked.is_none() {
                    return Err(StoreError::conflict("user", "growid already registered"));
                }
                let sql = format!(
                    "UPDATE users SET website_username = $2, password_hash = $3, \
                         is_web_active = TRUE, updated_at = now() \
                     WHERE growid = $1 RETURNING {}",
                    USER_COLUMNS
                );
                tx.query_one(&sql, &[&growid, &username, &password_hash])
                    .await
            }
            None => {
                let sql = format!(
                    "INSERT INTO users (growid, website_username, password_hash, is_web_active, role) \
                     VALUES ($1, $2, $3, TRUE, $4) RETURNING {}",
                    USER_COLUMNS
                );
                tx.query_one(&sql, &[&growid, &username, &password_hash, &role.as_db_str()])
                    .await
            }
        };
        let row = match result {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::conflict("user", "username or growid already taken"));
            }
            Err(e) => return Err(store_err(e)),
        };

        if let (Some(discord_id), None) = (discord_id, linked.as_deref()) {
            let inserted = tx
                .execute(
                    "INSERT INTO discord_links (discord_id, growid) VALUES ($1, $2)",
                    &[&discord_id, &growid],
                )
                .await;
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(StoreError::conflict(
                        "discord link",
                        "discord id already linked",
                    ));
                }
                Err(e) => return Err(store_err(e)),
            }
        }

        let user = user_from_row(&row)?;
        tx.commit().await.map_err(store_err)?;
        Ok(user)
    }

    async fn web_credentials(&self, username: &str) -> StoreResult<Option<WebCredentials>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT growid, website_username, password_hash, role FROM users \
                 WHERE website_username = $1 AND password_hash IS NOT NULL",
                &[&username],
            )
            .await
            .map_err(store_err)?;
        row.map(|row| {
            Ok(WebCredentials {
                growid: col(&row, "growid")?,
                username: col(&row, "website_username")?,
                password_hash: col(&row, "password_hash")?,
                role: enum_col(&row, "role")?,
            })
        })
        .transpose()
    }

    async fn web_password_update(&self, growid: &str, password_hash: &str) -> StoreResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE users SET password_hash = $2, updated_at = now() WHERE growid = $1",
                &[&growid, &password_hash],
            )
            .await
            .map_err(store_err)?;
        if updated == 0 {
            return Err(StoreError::not_found("user", growid));
        }
        Ok(())
    }

    async fn user_set_role(&self, growid: &str, role: UserRole) -> StoreResult<User> {
        let conn = self.conn().await?;
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE growid = $1 RETURNING {}",
            USER_COLUMNS
        );
        conn.query_opt(&sql, &[&growid, &role.as_db_str()])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("user", growid))
    }

    // === Balances and rates ===

    async fn balance_get(&self, growid: &str) -> StoreResult<Balance> {
        let conn = self.conn().await?;
        conn.query_opt(
            "SELECT balance_wl, balance_dl, balance_bgl, balance_rupiah FROM users \
             WHERE growid = $1",
            &[&growid],
        )
        .await
        .map_err(store_err)?
        .as_ref()
        .map(balance_from_row)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("user", growid))
    }

    async fn balance_adjust(
        &self,
        growid: &str,
        currency: Currency,
        delta: i64,
    ) -> StoreResult<BalanceChange> {
        let column = currency.balance_column();
        let conn = self.conn().await?;
        // Guarded single-statement update: never goes negative
        let sql = format!(
            "UPDATE users SET {col} = {col} + $2, updated_at = now() \
             WHERE growid = $1 AND {col} + $2 >= 0 \
             RETURNING balance_wl, balance_dl, balance_bgl, balance_rupiah",
            col = column
        );
        let row = conn
            .query_opt(&sql, &[&growid, &delta])
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            drop(conn);
            return if self.user_exists(growid).await? {
                Err(StoreError::InsufficientBalance {
                    growid: growid.to_string(),
                    currency: currency.to_string(),
                })
            } else {
                Err(StoreError::not_found("user", growid))
            };
        };

        let new = balance_from_row(&row)?;
        let old = new
            .apply(currency, -delta)
            .ok_or_else(|| StoreError::InvalidData {
                reason: format!("balance of {} out of range", growid),
            })?;
        Ok(BalanceChange { old, new })
    }

    async fn conversion_rates(&self) -> StoreResult<Vec<ConversionRate>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM conversion_rates WHERE is_active ORDER BY currency",
            RATE_COLUMNS
        );
        conn.query(&sql, &[])
            .await
            .map_err(store_err)?
            .iter()
            .map(rate_from_row)
            .collect()
    }

    async fn conversion_rate_set(
        &self,
        currency: Currency,
        rate: i64,
        updated_by: &str,
    ) -> StoreResult<ConversionRate> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(store_err)?;
        tx.execute(
            "UPDATE conversion_rates SET is_active = FALSE, updated_at = now() \
             WHERE currency = $1 AND is_active",
            &[&currency.as_db_str()],
        )
        .await
        .map_err(store_err)?;
        let sql = format!(
            "INSERT INTO conversion_rates (currency, rate, is_active, updated_by) \
             VALUES ($1, $2, TRUE, $3) RETURNING {}",
            RATE_COLUMNS
        );
        let row = tx
            .query_one(&sql, &[&currency.as_db_str(), &rate, &updated_by])
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        rate_from_row(&row)
    }

    // === Products ===

    async fn product_create(&self, product: &NewProduct) -> StoreResult<Product> {
        let conn = self.conn().await?;
        let result = conn
            .query_one(
                "INSERT INTO products (code, name, price, description) VALUES ($1, $2, $3, $4) \
                 RETURNING code, name, price, description, created_at, updated_at",
                &[
                    &product.code,
                    &product.name,
                    &product.price,
                    &product.description,
                ],
            )
            .await;
        match result {
            Ok(row) => product_from_row(&row, false),
            Err(e) if is_unique_violation(&e) => Err(StoreError::conflict(
                "product",
                format!("{} already exists", product.code),
            )),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn product_get(&self, code: &str) -> StoreResult<Option<Product>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {}, (SELECT COUNT(*) FROM stock s \
                 WHERE s.product_code = p.code AND s.status = 'available') AS stock_available \
             FROM products p WHERE p.code = $1",
            PRODUCT_COLUMNS
        );
        conn.query_opt(&sql, &[&code])
            .await
            .map_err(store_err)?
            .map(|row| product_from_row(&row, true))
            .transpose()
    }

    async fn product_list(&self, include_stock: bool) -> StoreResult<Vec<Product>> {
        let conn = self.conn().await?;
        let sql = if include_stock {
            format!(
                "SELECT {}, (SELECT COUNT(*) FROM stock s \
                     WHERE s.product_code = p.code AND s.status = 'available') AS stock_available \
                 FROM products p ORDER BY p.code",
                PRODUCT_COLUMNS
            )
        } else {
            format!("SELECT {} FROM products p ORDER BY p.code", PRODUCT_COLUMNS)
        };
        conn.query(&sql, &[])
            .await
            .map_err(store_err)?
            .iter()
            .map(|row| product_from_row(row, include_stock))
            .collect()
    }

    async fn product_update(&self, code: &str, update: &ProductUpdate) -> StoreResult<Product> {
        let conn = self.conn().await?;
        conn.query_opt(
            "UPDATE products SET \
                 name = COALESCE($2, name), \
                 price = COALESCE($3, price), \
                 description = COALESCE($4, description), \
                 updated_at = now() \
             WHERE code = $1 \
             RETURNING code, name, price, description, created_at, updated_at",
            &[&code, &update.name, &update.price, &update.description],
        )
        .await
        .map_err(store_err)?
        .map(|row| product_from_row(&row, false))
        .transpose()?
        .ok_or_else(|| StoreError::not_found("product", code))
    }

    async fn product_delete(&self, code: &str) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let removed = conn
            .execute("DELETE FROM products WHERE code = $1", &[&code])
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    // === Stock ===

    async fn stock_add(
        &self,
        product_code: &str,
        content: &str,
        added_by: &str,
    ) -> StoreResult<StockItem> {
        let conn = self.conn().await?;
        let sql = format!(
            "INSERT INTO stock (product_code, content, added_by) VALUES ($1, $2, $3) \
             RETURNING {}",
            STOCK_COLUMNS
        );
        match conn.query_one(&sql, &[&product_code, &content, &added_by]).await {
            Ok(row) => stock_from_row(&row),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::conflict("stock", "content already exists"))
            }
            Err(e) if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) => {
                Err(StoreError::not_found("product", product_code))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    async fn stock_bulk_add(
        &self,
        product_code: &str,
        contents: &[String],
        added_by: &str,
    ) -> StoreResult<BulkAddOutcome> {
        let conn = self.conn().await?;
        let exists = conn
            .query_opt("SELECT 1 FROM products WHERE code = $1", &[&product_code])
            .await
            .map_err(store_err)?;
        if exists.is_none() {
            return Err(StoreError::not_found("product", product_code));
        }
        let inserted = conn
            .execute(
                "INSERT INTO stock (product_code, content, added_by) \
                 SELECT $1, c, $3 FROM UNNEST($2::text[]) AS c \
                 ON CONFLICT (content) DO NOTHING",
                &[&product_code, &contents, &added_by],
            )
            .await
            .map_err(store_err)?;
        Ok(BulkAddOutcome::new(contents.len(), inserted as usize))
    }

    async fn stock_available(
        &self,
        product_code: &str,
        limit: i64,
    ) -> StoreResult<Vec<StockItem>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM stock WHERE product_code = $1 AND status = 'available' \
             ORDER BY added_at, id LIMIT $2",
            STOCK_COLUMNS
        );
        conn.query(&sql, &[&product_code, &limit.max(0)])
            .await
            .map_err(store_err)?
            .iter()
            .map(stock_from_row)
            .collect()
    }

    async fn stock_get(&self, id: i64) -> StoreResult<Option<StockItem>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM stock WHERE id = $1", STOCK_COLUMNS);
        conn.query_opt(&sql, &[&id])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(stock_from_row)
            .transpose()
    }

    async fn stock_update_status(
        &self,
        id: i64,
        status: StockStatus,
        buyer_id: Option<&str>,
    ) -> StoreResult<StockItem> {
        let conn = self.conn().await?;
        let sql = format!(
            "UPDATE stock SET status = $2, buyer_id = COALESCE($3, buyer_id), updated_at = now() \
             WHERE id = $1 RETURNING {}",
            STOCK_COLUMNS
        );
        conn.query_opt(&sql, &[&id, &status.as_db_str(), &buyer_id])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(stock_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("stock", id))
    }

    async fn stock_history(&self, filter: &StockFilter) -> StoreResult<Vec<StockItem>> {
        let conn = self.conn().await?;
        let status = filter.status.map(|s| s.as_db_str());
        let sql = format!(
            "SELECT {} FROM stock \
             WHERE ($1::text IS NULL OR product_code = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY updated_at DESC, id DESC LIMIT $3",
            STOCK_COLUMNS
        );
        conn.query(&sql, &[&filter.product_code, &status, &filter.limit.max(0)])
            .await
            .map_err(store_err)?
            .iter()
            .map(stock_from_row)
            .collect()
    }

    // === Transactions ===

    async fn transaction_create(&self, tx: &NewTransaction) -> StoreResult<Transaction> {
        let conn = self.conn().await?;
        let sql = format!(
            "INSERT INTO transactions (growid, platform, type, currency, amount, details, \
                 old_balance, new_balance, items_count, total_price) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            TRANSACTION_COLUMNS
        );
        let result = conn
            .query_one(
                &sql,
                &[
                    &tx.growid,
                    &tx.platform.as_db_str(),
                    &tx.kind.as_db_str(),
                    &tx.currency.as_db_str(),
                    &tx.amount,
                    &tx.details(),
                    &tx.old_balance,
                    &tx.new_balance,
                    &tx.items_count,
                    &tx.total_price,
                ],
            )
            .await;
        match result {
            Ok(row) => transaction_from_row(&row),
            Err(e) if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) => {
                Err(StoreError::not_found("user", &tx.growid))
            }
            Err(e) => Err(store_err(e)),
        }
    }

    async fn transactions_for_user(
        &self,
        growid: &str,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM transactions WHERE growid = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
            TRANSACTION_COLUMNS
        );
        conn.query(&sql, &[&growid, &limit.max(0)])
            .await
            .map_err(store_err)?
            .iter()
            .map(transaction_from_row)
            .collect()
    }

    // === Settings and flags ===

    async fn setting_get(
        &self,
        category: SettingCategory,
        key: &str,
    ) -> StoreResult<Option<Setting>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM settings WHERE category = $1 AND key = $2",
            SETTING_COLUMNS
        );
        conn.query_opt(&sql, &[&category.as_db_str(), &key])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(setting_from_row)
            .transpose()
    }

    async fn setting_put(&self, input: &SettingInput) -> StoreResult<Setting> {
        let conn = self.conn().await?;
        let metadata = JsonValue::Object(input.metadata.clone());
        let sql = format!(
            "INSERT INTO settings (category, key, value, description, is_public, metadata, \
                 updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (category, key) DO UPDATE SET \
                 value = EXCLUDED.value, \
                 description = EXCLUDED.description, \
                 is_public = EXCLUDED.is_public, \
                 metadata = EXCLUDED.metadata, \
                 updated_by = EXCLUDED.updated_by, \
                 updated_at = now() \
             RETURNING {}",
            SETTING_COLUMNS
        );
        let row = conn
            .query_one(
                &sql,
                &[
                    &input.category.as_db_str(),
                    &input.key,
                    &input.value,
                    &input.description,
                    &input.is_public,
                    &metadata,
                    &input.updated_by,
                ],
            )
            .await
            .map_err(store_err)?;
        setting_from_row(&row)
    }

    async fn setting_delete(&self, category: SettingCategory, key: &str) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM settings WHERE category = $1 AND key = $2",
                &[&category.as_db_str(), &key],
            )
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn flag_get(&self, name: &str) -> StoreResult<Option<FeatureFlag>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM feature_flags WHERE name = $1", FLAG_COLUMNS);
        conn.query_opt(&sql, &[&name])
            .await
            .map_err(store_err)?
            .as_ref()
            .map(flag_from_row)
            .transpose()
    }

    async fn flag_put(&self, input: &FlagInput) -> StoreResult<FeatureFlag> {
        let conditions = serde_json::to_value(&input.conditions).map_err(|e| {
            StoreError::InvalidData {
                reason: e.to_string(),
            }
        })?;
        let conn = self.conn().await?;
        let sql = format!(
            "INSERT INTO feature_flags (name, description, enabled, conditions, updated_by) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (name) DO UPDATE SET \
                 description = EXCLUDED.description, \
                 enabled = EXCLUDED.enabled, \
                 conditions = EXCLUDED.conditions, \
                 updated_by = EXCLUDED.updated_by, \
                 updated_at = now() \
             RETURNING {}",
            FLAG_COLUMNS
        );
        let row = conn
            .query_one(
                &sql,
                &[
                    &input.name,
                    &input.description,
                    &input.enabled,
                    &conditions,
                    &input.updated_by,
                ],
            )
            .await
            .map_err(store_err)?;
        flag_from_row(&row)
    }

    // === Blacklist ===

    async fn blacklist_add(
        &self,
        growid: &str,
        added_by: &str,
        reason: Option<&str>,
    ) -> StoreResult<BlacklistEntry> {
        let conn = self.conn().await?;
        let result = conn
            .query_one(
                "INSERT INTO blacklist (growid, added_by, reason) VALUES ($1, $2, $3) \
                 RETURNING growid, added_by, reason, added_at",
                &[&growid, &added_by, &reason],
            )
            .await;
        match result {
            Ok(row) => blacklist_from_row(&row),
            Err(e) if is_unique_violation(&e) => Err(StoreError::conflict(
                "blacklist",
                format!("{} is already blacklisted", growid),
            )),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn blacklist_remove(&self, growid: &str) -> StoreResult<bool> {
        let conn = self.conn().await?;
        let removed = conn
            .execute("DELETE FROM blacklist WHERE growid = $1", &[&growid])
            .await
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn blacklist_get(&self, growid: &str) -> StoreResult<Option<BlacklistEntry>> {
        let conn = self.conn().await?;
        conn.query_opt(
            "SELECT growid, added_by, reason, added_at FROM blacklist WHERE growid = $1",
            &[&growid],
        )
        .await
        .map_err(store_err)?
        .as_ref()
        .map(blacklist_from_row)
        .transpose()
    }

    async fn blacklist_list(&self) -> StoreResult<Vec<BlacklistEntry>> {
        let conn = self.conn().await?;
        conn.query(
            "SELECT growid, added_by, reason, added_at FROM blacklist ORDER BY added_at DESC",
            &[],
        )
        .await
        .map_err(store_err)?
        .iter()
        .map(blacklist_from_row)
        .collect()
    }

    // === Audit ===

    async fn admin_log_record(&self, entry: &NewAdminLog) -> StoreResult<AdminLog> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO admin_logs (admin_id, platform, action, target, details) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, admin_id, platform, action, target, details, created_at",
                &[
                    &entry.admin_id,
                    &entry.platform.as_db_str(),
                    &entry.action,
                    &entry.target,
                    &entry.details,
                ],
            )
            .await
            .map_err(store_err)?;
        admin_log_from_row(&row)
    }

    async fn admin_logs_recent(&self, limit: i64) -> StoreResult<Vec<AdminLog>> {
        let conn = self.conn().await?;
        conn.query(
            "SELECT id, admin_id, platform, action, target, details, created_at \
             FROM admin_logs ORDER BY created_at DESC, id DESC LIMIT $1",
            &[&limit.max(0)],
        )
        .await
        .map_err(store_err)?
        .iter()
        .map(admin_log_from_row)
        .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(store_err)?;
        Ok(())
    }
}

// ============================================================================
// AUXILIARY BACKENDS
// ============================================================================

fn backend_err(err: impl std::fmt::Display) -> BackendError {
    BackendError::Unavailable(err.to_string())
}

/// Rate-limit counters in `rate_limit_counters`.
#[derive(Clone)]
pub struct PgCounterStore {
    pool: Pool,
}

impl PgCounterStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Start a window, count inside it, or restart an expired one, in one
/// statement. The expiry only moves when a window restarts.
const INCR_WITH_EXPIRE: &str = "\
    INSERT INTO rate_limit_counters (key, count, expires_at) \
    VALUES ($1, 1, now() + $2::float8 * interval '1 second') \
    ON CONFLICT (key) DO UPDATE SET \
        count = CASE WHEN rate_limit_counters.expires_at <= now() \
                     THEN 1 ELSE rate_limit_counters.count + 1 END, \
        expires_at = CASE WHEN rate_limit_counters.expires_at <= now() \
                          THEN EXCLUDED.expires_at ELSE rate_limit_counters.expires_at END \
    RETURNING count, \
        GREATEST(EXTRACT(EPOCH FROM (expires_at - now())) * 1000, 0)::BIGINT AS resets_in_ms";

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn incr_with_expire(&self, key: &str, window: Duration) -> BackendResult<CounterHit> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let row = conn
            .query_one(INCR_WITH_EXPIRE, &[&key, &window.as_secs_f64()])
            .await
            .map_err(backend_err)?;
        let count: i64 = row.try_get("count").map_err(backend_err)?;
        let resets_in_ms: i64 = row.try_get("resets_in_ms").map_err(backend_err)?;
        Ok(CounterHit {
            count: count.max(0) as u64,
            resets_in: Duration::from_millis(resets_in_ms.max(0) as u64),
        })
    }

    async fn delete_matching(&self, pattern: &str) -> BackendResult<u64> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        conn.execute(
            "DELETE FROM rate_limit_counters WHERE key LIKE $1 ESCAPE '\\'",
            &[&glob_to_like(pattern)],
        )
        .await
        .map_err(backend_err)
    }

    async fn purge_expired(&self) -> BackendResult<u64> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        conn.execute(
            "DELETE FROM rate_limit_counters WHERE expires_at <= now()",
            &[],
        )
        .await
        .map_err(backend_err)
    }
}

/// Cached responses in `cache_entries`.
#[derive(Clone)]
pub struct PgCacheBackend {
    pool: Pool,
}

impl PgCacheBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for PgCacheBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<CachedResponse>> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        let row = conn
            .query_opt(
                "SELECT value FROM cache_entries WHERE key = $1 AND expires_at > now()",
                &[&key],
            )
            .await
            .map_err(backend_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let value: JsonValue = row.try_get("value").map_err(backend_err)?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| BackendError::Corrupt(e.to_string()))
    }

    async fn set(&self, key: &str, value: &CachedResponse, ttl: Duration) -> BackendResult<()> {
        let value =
            serde_json::to_value(value).map_err(|e| BackendError::Corrupt(e.to_string()))?;
        let conn = self.pool.get().await.map_err(backend_err)?;
        conn.execute(
            "INSERT INTO cache_entries (key, value, expires_at) \
             VALUES ($1, $2, now() + $3::float8 * interval '1 second') \
             ON CONFLICT (key) DO UPDATE SET \
                 value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
            &[&key, &value, &ttl.as_secs_f64()],
        )
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> BackendResult<u64> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        conn.execute(
            "DELETE FROM cache_entries WHERE key LIKE $1 ESCAPE '\\'",
            &[&glob_to_like(pattern)],
        )
        .await
        .map_err(backend_err)
    }

    async fn purge_expired(&self) -> BackendResult<u64> {
        let conn = self.pool.get().await.map_err(backend_err)?;
        conn.execute("DELETE FROM cache_entries WHERE expires_at <= now()", &[])
            .await
            .map_err(backend_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "lockshop");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_balance_columns_match_schema() {
        for currency in Currency::ALL {
            assert!(SCHEMA.contains(currency.balance_column()));
            assert!(USER_COLUMNS.contains(currency.balance_column()));
        }
    }

    #[test]
    fn test_pool_builds_without_connecting() {
        // deadpool connects lazily
        assert!(DbConfig::default().create_pool().is_ok());
    }
}
