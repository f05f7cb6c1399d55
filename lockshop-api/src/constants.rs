//! Constants for the Lockshop API
//!
//! Centralized values shared by routes, services and the server binary.

// ============================================================================
// ROUTING
// ============================================================================

/// Prefix of every versioned REST route.
pub const API_PREFIX: &str = "/api/v1";

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host when `LOCKSHOP_API_BIND` is unset.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default port when neither `PORT` nor `LOCKSHOP_API_PORT` is set.
pub const DEFAULT_PORT: u16 = 8000;

// ============================================================================
// LISTINGS
// ============================================================================

/// Default page size for transaction and audit listings.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Largest page size a caller may ask for.
pub const MAX_LIST_LIMIT: i64 = 500;

/// Largest number of items accepted by a bulk stock insert.
pub const MAX_BULK_STOCK_ITEMS: usize = 1000;

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Shortest accepted web password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest accepted growid.
pub const MAX_GROWID_LEN: usize = 32;

/// Bytes of random salt per password hash.
pub const PASSWORD_SALT_BYTES: usize = 16;

/// Clamp a caller-supplied page size into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}
