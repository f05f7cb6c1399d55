//! Settings and Feature Flag Service

use lockshop_core::{
    FeatureFlag, FlagContext, FlagInput, Setting, SettingCategory, SettingInput,
};
use lockshop_storage::ShopStore;

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::types::{FlagPutRequest, SettingPutRequest};
use crate::validation::{ValidateNonEmpty, ValidateRange};

/// Read a setting. Non-admins only see public settings.
pub async fn get_setting(
    store: &dyn ShopStore,
    caller: &AuthContext,
    category: SettingCategory,
    key: &str,
) -> ApiResult<Setting> {
    let setting = store
        .setting_get(category, key)
        .await?
        .ok_or_else(|| ApiError::not_found("setting", format!("{}/{}", category, key)))?;
    if !setting.is_public {
        caller.require_admin()?;
    }
    Ok(setting)
}

pub async fn put_setting(
    store: &dyn ShopStore,
    category: SettingCategory,
    key: &str,
    req: SettingPutRequest,
    updated_by: &str,
) -> ApiResult<Setting> {
    key.validate_non_empty("key")?;
    let setting = store
        .setting_put(&SettingInput {
            category,
            key: key.to_string(),
            value: req.value,
            description: req.description,
            is_public: req.is_public,
            metadata: req.metadata,
            updated_by: updated_by.to_string(),
        })
        .await?;
    tracing::info!(category = %category, key = %key, "Setting stored");
    Ok(setting)
}

pub async fn delete_setting(
    store: &dyn ShopStore,
    category: SettingCategory,
    key: &str,
) -> ApiResult<()> {
    if !store.setting_delete(category, key).await? {
        return Err(ApiError::not_found("setting", format!("{}/{}", category, key)));
    }
    Ok(())
}

pub async fn get_flag(store: &dyn ShopStore, name: &str) -> ApiResult<FeatureFlag> {
    store
        .flag_get(name)
        .await?
        .ok_or_else(|| ApiError::not_found("feature flag", name))
}

pub async fn put_flag(
    store: &dyn ShopStore,
    name: &str,
    req: FlagPutRequest,
    updated_by: &str,
) -> ApiResult<FeatureFlag> {
    name.validate_non_empty("name")?;
    if let Some(percentage) = req.conditions.percentage {
        percentage.validate_range("conditions.percentage", 0, 100)?;
    }
    let flag = store
        .flag_put(&FlagInput {
            name: name.to_string(),
            description: req.description,
            enabled: req.enabled,
            conditions: req.conditions,
            updated_by: updated_by.to_string(),
        })
        .await?;
    tracing::info!(flag = %name, enabled = flag.enabled, "Feature flag stored");
    Ok(flag)
}

/// Evaluate a flag for the caller. Unknown flags are off.
pub async fn check_flag(
    store: &dyn ShopStore,
    name: &str,
    caller: &AuthContext,
) -> ApiResult<bool> {
    let Some(flag) = store.flag_get(name).await? else {
        return Ok(false);
    };
    let context = FlagContext {
        user_id: Some(caller.growid.clone()),
        user_role: Some(caller.role.as_db_str().to_string()),
    };
    Ok(flag.is_enabled_for(&context))
}
