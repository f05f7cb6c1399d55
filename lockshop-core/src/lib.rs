//! Lockshop Core - Entity Types
//!
//! Plain data for the shop: users and balances, products and stock,
//! transactions, conversion rates, settings, feature flags, blacklist and
//! audit records. All other crates depend on this one.

use chrono::{DateTime, Utc};

pub mod conversion;
pub mod entities;
pub mod enums;
pub mod error;
pub mod flags;

pub use conversion::{ConversionError, ConversionQuote, RateTable};
pub use entities::*;
pub use enums::{
    Currency, EnumParseError, Platform, SettingCategory, StockStatus, TransactionType, UserRole,
};
pub use error::{StoreError, StoreResult};
pub use flags::{rollout_bucket, FeatureFlag, FlagConditions, FlagContext, FlagInput};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
