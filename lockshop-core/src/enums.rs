//! Enum types for Lockshop entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an enum from its database string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

/// Implements `as_db_str`, `from_db_str`, `Display` and `FromStr` for a
/// fieldless enum stored as lowercase text.
macro_rules! db_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Convert to database string representation.
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Parse from database string representation.
            pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(EnumParseError { kind: $kind, value: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_db_str())
            }
        }

        impl FromStr for $name {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }
    };
}

// ============================================================================
// CURRENCY
// ============================================================================

/// Balance currency. Lock currencies convert through their rupiah rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// World Lock
    Wl,
    /// Diamond Lock (100 WL)
    Dl,
    /// Blue Gem Lock (100 DL)
    Bgl,
    /// Indonesian Rupiah
    Rupiah,
}

db_enum!(Currency, "currency", {
    Wl => "wl",
    Dl => "dl",
    Bgl => "bgl",
    Rupiah => "rupiah",
});

impl Currency {
    /// All currencies held in a user balance.
    pub const ALL: [Currency; 4] = [Currency::Wl, Currency::Dl, Currency::Bgl, Currency::Rupiah];

    /// Currencies that carry a conversion rate.
    pub const LOCKS: [Currency; 3] = [Currency::Wl, Currency::Dl, Currency::Bgl];

    /// Whether this is a lock currency with a configurable rate.
    pub fn is_lock(&self) -> bool {
        !matches!(self, Currency::Rupiah)
    }

    /// Users table column holding this currency.
    pub fn balance_column(&self) -> &'static str {
        match self {
            Currency::Wl => "balance_wl",
            Currency::Dl => "balance_dl",
            Currency::Bgl => "balance_bgl",
            Currency::Rupiah => "balance_rupiah",
        }
    }

    /// Rupiah value of one unit under the seeded defaults.
    pub fn default_rate(&self) -> i64 {
        match self {
            Currency::Wl => 3_000,
            Currency::Dl => 300_000,
            Currency::Bgl => 30_000_000,
            Currency::Rupiah => 1,
        }
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

/// Where an action originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Discord,
    Web,
}

db_enum!(Platform, "platform", {
    Discord => "discord",
    Web => "web",
});

// ============================================================================
// STOCK STATUS
// ============================================================================

/// Lifecycle of a stock item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    #[default]
    Available,
    Sold,
    Deleted,
}

db_enum!(StockStatus, "stock status", {
    Available => "available",
    Sold => "sold",
    Deleted => "deleted",
});

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

/// Kind of balance movement recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Purchase,
    Conversion,
    Refund,
    AdminAdjustment,
}

db_enum!(TransactionType, "transaction type", {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Purchase => "purchase",
    Conversion => "conversion",
    Refund => "refund",
    AdminAdjustment => "admin_adjustment",
});

// ============================================================================
// USER ROLE
// ============================================================================

/// Account role. Drives rate limits and admin route access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Basic,
    Premium,
    Admin,
}

db_enum!(UserRole, "user role", {
    Basic => "basic",
    Premium => "premium",
    Admin => "admin",
});

// ============================================================================
// SETTING CATEGORY
// ============================================================================

/// Namespace for shop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingCategory {
    General,
    Shop,
    Payment,
    Security,
    Notification,
}

db_enum!(SettingCategory, "setting category", {
    General => "general",
    Shop => "shop",
    Payment => "payment",
    Security => "security",
    Notification => "notification",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_round_trip_through_db_str() {
        for currency in Currency::ALL {
            assert_eq!(Currency::from_db_str(currency.as_db_str()), Ok(currency));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("WL".parse::<Currency>(), Ok(Currency::Wl));
        assert_eq!("Sold".parse::<StockStatus>(), Ok(StockStatus::Sold));
        assert_eq!("ADMIN".parse::<UserRole>(), Ok(UserRole::Admin));
    }

    #[test]
    fn test_parse_error_names_the_kind() {
        let err = "gems".parse::<Currency>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid currency: gems");
    }

    #[test]
    fn test_transaction_type_serde_matches_db_str() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&TransactionType::AdminAdjustment)?;
        assert_eq!(json, "\"admin_adjustment\"");
        assert_eq!(TransactionType::AdminAdjustment.as_db_str(), "admin_adjustment");
        Ok(())
    }

    #[test]
    fn test_rupiah_is_not_a_lock() {
        assert!(Currency::Wl.is_lock());
        assert!(!Currency::Rupiah.is_lock());
        assert_eq!(Currency::Dl.balance_column(), "balance_dl");
    }
}
