//! Request and response bodies for the REST routes.

use lockshop_core::{
    Balance, Currency, FlagConditions, SettingMetadata, StockStatus, TransactionType, User,
    UserRole,
};
use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;

// ============================================================================
// AUTH
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub growid: String,
    pub username: String,
    pub password: String,
    /// Discord account to link to the growid.
    #[serde(default)]
    pub discord_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Login and refresh response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub growid: String,
    pub role: UserRole,
}

// ============================================================================
// USERS AND BALANCES
// ============================================================================

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub growid: String,
    pub website_username: Option<String>,
    pub is_web_active: bool,
    pub role: UserRole,
    pub balance: Balance,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            growid: user.growid,
            website_username: user.website_username,
            is_web_active: user.is_web_active,
            role: user.role,
            balance: user.balance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdateRequest {
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAdjustRequest {
    pub currency: Currency,
    /// Signed delta; negative debits.
    pub amount: i64,
    #[serde(default = "default_adjust_type")]
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

fn default_adjust_type() -> TransactionType {
    TransactionType::AdminAdjustment
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub amount: i64,
    pub from: Currency,
    pub to: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateUpdateRequest {
    pub rate: i64,
}

// ============================================================================
// STOCK
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAddRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockBulkRequest {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockUpdateRequest {
    pub status: StockStatus,
    /// Required when marking an item sold.
    #[serde(default)]
    pub buyer_id: Option<String>,
}

// ============================================================================
// SETTINGS, FLAGS, BLACKLIST
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingPutRequest {
    pub value: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub metadata: SettingMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagPutRequest {
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: FlagConditions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCheckResponse {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistAddRequest {
    pub growid: String,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// ADMIN AND LISTINGS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheClearRequest {
    /// Glob over cache keys; absent clears everything.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductListQuery {
    #[serde(default)]
    pub include_stock: Option<bool>,
}

/// Count of entries removed by an administrative clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedResponse {
    pub removed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
