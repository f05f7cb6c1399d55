//! Field validation traits used by route handlers.
//!
//! Every failure is a 422 `ValidationError` naming the offending field.

use lockshop_core::ProductUpdate;

use crate::constants::MAX_GROWID_LEN;
use crate::error::{ApiError, ApiResult};

/// Non-empty string checks.
///
/// ```ignore
/// use lockshop_api::validation::ValidateNonEmpty;
///
/// req.growid.validate_non_empty("growid")?;
/// ```
pub trait ValidateNonEmpty {
    /// Fails if the value is empty or whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        if self.trim().is_empty() {
            return Err(ApiError::invalid_field(field_name, "field must not be empty"));
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(ApiError::invalid_field(field_name, "field required")),
        }
    }
}

/// Numeric range checks.
pub trait ValidateRange {
    /// Value must be greater than zero.
    fn validate_positive(&self, field_name: &str) -> ApiResult<()>;

    /// Value must be zero or more.
    fn validate_non_negative(&self, field_name: &str) -> ApiResult<()>;

    /// Value must lie in `min..=max`.
    fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()>
    where
        Self: Sized;
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_positive(&self, field_name: &str) -> ApiResult<()> {
                    if *self <= 0 as $t {
                        return Err(ApiError::invalid_field(
                            field_name,
                            "ensure this value is greater than 0",
                        ));
                    }
                    Ok(())
                }

                fn validate_non_negative(&self, field_name: &str) -> ApiResult<()> {
                    #[allow(unused_comparisons)]
                    if *self < 0 as $t {
                        return Err(ApiError::invalid_field(
                            field_name,
                            "ensure this value is greater than or equal to 0",
                        ));
                    }
                    Ok(())
                }

                fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()> {
                    if *self < min || *self > max {
                        return Err(ApiError::invalid_field(
                            field_name,
                            format!("ensure this value is between {} and {}", min, max),
                        ));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(i32, i64, u8, u32, u64, usize);

/// Growids are ASCII letters, digits and underscores.
///
/// Growids end up inside `:`-separated counter keys and glob patterns, so
/// separators and wildcards are refused here.
pub fn validate_growid(field_name: &str, growid: &str) -> ApiResult<()> {
    growid.validate_non_empty(field_name)?;
    if growid.chars().count() > MAX_GROWID_LEN {
        return Err(ApiError::invalid_field(
            field_name,
            format!("ensure this value has at most {} characters", MAX_GROWID_LEN),
        ));
    }
    if !growid.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::invalid_field(
            field_name,
            "only letters, digits and underscores are allowed",
        ));
    }
    Ok(())
}

/// Update payloads that must set at least one field.
pub trait HasUpdates {
    fn has_any_updates(&self) -> bool;

    fn validate_has_updates(&self) -> ApiResult<()> {
        if !self.has_any_updates() {
            return Err(ApiError::bad_request(
                "At least one field must be provided for update",
            ));
        }
        Ok(())
    }
}

impl HasUpdates for ProductUpdate {
    fn has_any_updates(&self) -> bool {
        !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_validate_non_empty() {
        assert!("STEVE".validate_non_empty("growid").is_ok());
        assert!("   ".validate_non_empty("growid").is_err());
        assert!(String::new().validate_non_empty("growid").is_err());

        let missing: Option<String> = None;
        let err = missing
            .validate_non_empty("name")
            .expect_err("missing field must fail");
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[test]
    fn test_validate_ranges() {
        assert!(5i64.validate_positive("amount").is_ok());
        assert!(0i64.validate_positive("amount").is_err());
        assert!(0i64.validate_non_negative("price").is_ok());
        assert!((-1i64).validate_non_negative("price").is_err());
        assert!(100u8.validate_range("percentage", 0, 100).is_ok());
        assert!(101u8.validate_range("percentage", 0, 100).is_err());
    }

    #[test]
    fn test_growid_rejects_separators_and_wildcards() {
        assert!(validate_growid("growid", "STEVE_99").is_ok());
        for bad in ["A:B", "A*", "A?", "A B", "", &"X".repeat(MAX_GROWID_LEN + 1)] {
            let err = validate_growid("growid", bad).expect_err("growid must be refused");
            assert_eq!(err.code, ErrorCode::ValidationError);
        }
    }

    #[test]
    fn test_empty_product_update_rejected() {
        let err = ProductUpdate::default()
            .validate_has_updates()
            .expect_err("empty update must fail");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
