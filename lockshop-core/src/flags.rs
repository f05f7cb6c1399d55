//! Feature flags with typed rollout conditions.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Conditions narrowing who sees an enabled flag.
///
/// Stored as JSON and read back with serde; unknown keys are rejected so a
/// typo in a stored condition fails loudly instead of silently widening the
/// rollout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagConditions {
    /// Roles allowed to see the flag. Absent means every role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_roles: Option<Vec<String>>,

    /// Percentage of users (0..=100) bucketed into the rollout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
}

impl FlagConditions {
    pub fn is_empty(&self) -> bool {
        self.user_roles.is_none() && self.percentage.is_none()
    }
}

/// Caller attributes a flag is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}

/// A named feature switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub conditions: FlagConditions,
    pub updated_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Upsert payload for a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagInput {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub conditions: FlagConditions,
    pub updated_by: String,
}

impl FeatureFlag {
    /// Decide whether the flag is on for a caller.
    ///
    /// A disabled flag is always off. Conditions only narrow an enabled flag
    /// when the context carries the attribute they test.
    pub fn is_enabled_for(&self, context: &FlagContext) -> bool {
        if !self.enabled {
            return false;
        }

        if let (Some(roles), Some(role)) = (&self.conditions.user_roles, &context.user_role) {
            if !roles.iter().any(|r| r == role) {
                return false;
            }
        }

        if let (Some(percentage), Some(user_id)) = (self.conditions.percentage, &context.user_id) {
            if rollout_bucket(&self.name, user_id) >= u32::from(percentage) {
                return false;
            }
        }

        true
    }
}

/// Stable bucket in `0..100` for a (flag, user) pair.
pub fn rollout_bucket(flag_name: &str, user_id: &str) -> u32 {
    let digest = Sha256::digest(format!("{}:{}", flag_name, user_id).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn flag(enabled: bool, conditions: FlagConditions) -> FeatureFlag {
        FeatureFlag {
            name: "new_checkout".to_string(),
            description: None,
            enabled,
            conditions,
            updated_by: "system".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx(user_id: Option<&str>, role: Option<&str>) -> FlagContext {
        FlagContext {
            user_id: user_id.map(str::to_string),
            user_role: role.map(str::to_string),
        }
    }

    #[test]
    fn test_disabled_flag_is_off() {
        let flag = flag(false, FlagConditions::default());
        assert!(!flag.is_enabled_for(&ctx(Some("A"), Some("admin"))));
    }

    #[test]
    fn test_role_condition() {
        let flag = flag(
            true,
            FlagConditions {
                user_roles: Some(vec!["admin".to_string()]),
                percentage: None,
            },
        );
        assert!(flag.is_enabled_for(&ctx(None, Some("admin"))));
        assert!(!flag.is_enabled_for(&ctx(None, Some("basic"))));
        // no role in context leaves the condition untested
        assert!(flag.is_enabled_for(&ctx(None, None)));
    }

    #[test]
    fn test_zero_and_full_percentage() {
        let none = flag(
            true,
            FlagConditions {
                user_roles: None,
                percentage: Some(0),
            },
        );
        let all = flag(
            true,
            FlagConditions {
                user_roles: None,
                percentage: Some(100),
            },
        );
        assert!(!none.is_enabled_for(&ctx(Some("GROWID1"), None)));
        assert!(all.is_enabled_for(&ctx(Some("GROWID1"), None)));
    }

    #[test]
    fn test_conditions_reject_unknown_keys() {
        let parsed: Result<FlagConditions, _> =
            serde_json::from_str(r#"{"percentage": 10, "__import__": "os"}"#);
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn prop_bucket_in_range_and_stable(name in "[a-z_]{1,20}", user in "[A-Za-z0-9]{1,20}") {
            let first = rollout_bucket(&name, &user);
            prop_assert!(first < 100);
            prop_assert_eq!(first, rollout_bucket(&name, &user));
        }

        #[test]
        fn prop_rollout_is_monotonic_in_percentage(user in "[A-Za-z0-9]{1,20}", pct in 0u8..100) {
            let lower = flag(true, FlagConditions { user_roles: None, percentage: Some(pct) });
            let higher = flag(true, FlagConditions { user_roles: None, percentage: Some(pct + 1) });
            let context = ctx(Some(&user), None);
            if lower.is_enabled_for(&context) {
                prop_assert!(higher.is_enabled_for(&context));
            }
        }
    }
}
