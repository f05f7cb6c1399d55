//! Currency conversion through rupiah rates.

use crate::{ConversionRate, Currency};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Conversion failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("No active rate for {0}")]
    MissingRate(Currency),

    #[error("Conversion of {amount} {from} overflows")]
    Overflow { amount: i64, from: Currency },
}

/// Result of converting an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub from: Currency,
    pub to: Currency,
    pub amount: i64,
    /// Whole units of the target currency.
    pub result: i64,
    /// Rupiah value left over after whole units.
    pub remainder_rupiah: i64,
    pub rate_from: i64,
    pub rate_to: i64,
}

/// Active rupiah rates keyed by currency. Rupiah is always 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateTable {
    rates: HashMap<Currency, i64>,
}

impl RateTable {
    /// Build from active rates. Inactive rows are ignored.
    pub fn from_rates(rates: &[ConversionRate]) -> Self {
        let rates = rates
            .iter()
            .filter(|r| r.is_active && r.rate > 0)
            .map(|r| (r.currency, r.rate))
            .collect();
        Self { rates }
    }

    /// Table holding the seeded default rates.
    pub fn defaults() -> Self {
        let rates = Currency::LOCKS
            .iter()
            .map(|c| (*c, c.default_rate()))
            .collect();
        Self { rates }
    }

    pub fn rate(&self, currency: Currency) -> Option<i64> {
        match currency {
            Currency::Rupiah => Some(1),
            other => self.rates.get(&other).copied(),
        }
    }

    /// Rates as a currency → rate map, for responses.
    pub fn as_map(&self) -> HashMap<Currency, i64> {
        self.rates.clone()
    }

    /// Convert `amount` of `from` into whole units of `to`.
    pub fn convert(
        &self,
        amount: i64,
        from: Currency,
        to: Currency,
    ) -> Result<ConversionQuote, ConversionError> {
        if amount <= 0 {
            return Err(ConversionError::NonPositiveAmount(amount));
        }
        let rate_from = self.rate(from).ok_or(ConversionError::MissingRate(from))?;
        let rate_to = self.rate(to).ok_or(ConversionError::MissingRate(to))?;

        let rupiah = amount
            .checked_mul(rate_from)
            .ok_or(ConversionError::Overflow { amount, from })?;

        Ok(ConversionQuote {
            from,
            to,
            amount,
            result: rupiah / rate_to,
            remainder_rupiah: rupiah % rate_to,
            rate_from,
            rate_to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_lock_ladder() -> Result<(), ConversionError> {
        let table = RateTable::defaults();
        assert_eq!(table.convert(100, Currency::Wl, Currency::Dl)?.result, 1);
        assert_eq!(table.convert(100, Currency::Dl, Currency::Bgl)?.result, 1);
        assert_eq!(table.convert(1, Currency::Bgl, Currency::Wl)?.result, 10_000);
        Ok(())
    }

    #[test]
    fn test_remainder_is_reported_in_rupiah() -> Result<(), ConversionError> {
        let quote = RateTable::defaults().convert(150, Currency::Wl, Currency::Dl)?;
        assert_eq!(quote.result, 1);
        assert_eq!(quote.remainder_rupiah, 50 * 3_000);
        Ok(())
    }

    #[test]
    fn test_rejects_non_positive_and_missing() {
        let table = RateTable::default();
        assert_eq!(
            table.convert(0, Currency::Rupiah, Currency::Rupiah),
            Err(ConversionError::NonPositiveAmount(0))
        );
        assert_eq!(
            table.convert(1, Currency::Wl, Currency::Rupiah),
            Err(ConversionError::MissingRate(Currency::Wl))
        );
    }

    proptest! {
        #[test]
        fn prop_whole_dl_multiples_are_exact(dl in 1i64..1_000_000) {
            let table = RateTable::defaults();
            let quote = table.convert(dl * 100, Currency::Wl, Currency::Dl).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(quote.result, dl);
            prop_assert_eq!(quote.remainder_rupiah, 0);
        }
    }
}
