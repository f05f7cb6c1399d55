//! Account Service
//!
//! Web registration, login, token refresh and password changes.

use lockshop_core::{User, UserRole};
use lockshop_storage::ShopStore;

use crate::auth::{TokenError, TokenService, TokenType};
use crate::config::ApiConfig;
use crate::constants::MIN_PASSWORD_LEN;
use crate::error::{ApiError, ApiResult};
use crate::services::password::{hash_password, verify_password};
use crate::types::{AuthResponse, RegisterRequest};
use crate::validation::{validate_growid, ValidateNonEmpty};

const BAD_CREDENTIALS: &str = "Invalid username or password";

fn validate_password(field: &str, password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid_field(
            field,
            format!("ensure this value has at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

async fn refuse_blacklisted(store: &dyn ShopStore, growid: &str) -> ApiResult<()> {
    if store.blacklist_get(growid).await?.is_some() {
        tracing::info!(growid = %growid, "Refused blacklisted account");
        return Err(ApiError::forbidden("Account is blacklisted"));
    }
    Ok(())
}

/// Create a web account for a growid.
///
/// A new growid gets a fresh user. An existing growid is only taken over
/// through the discord id already linked to it. Growids listed in
/// `LOCKSHOP_ADMIN_GROWIDS` are promoted to admin.
pub async fn register(
    store: &dyn ShopStore,
    config: &ApiConfig,
    req: &RegisterRequest,
) -> ApiResult<User> {
    let growid = req.growid.trim();
    validate_growid("growid", growid)?;
    req.username.validate_non_empty("username")?;
    validate_password("password", &req.password)?;
    refuse_blacklisted(store, growid).await?;

    let role = if config.is_bootstrap_admin(growid) {
        UserRole::Admin
    } else {
        UserRole::Basic
    };

    let discord_id = req
        .discord_id
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let hash = hash_password(&req.password);
    let mut user = store
        .web_account_create(growid, req.username.trim(), &hash, role, discord_id)
        .await?;

    // an existing user keeps its role unless it is a bootstrap admin
    if role == UserRole::Admin && user.role != UserRole::Admin {
        user = store.user_set_role(growid, UserRole::Admin).await?;
    }

    tracing::info!(growid = %growid, role = %user.role, "Web account registered");
    Ok(user)
}

/// Check a username and password and issue tokens.
pub async fn login(
    store: &dyn ShopStore,
    tokens: &TokenService,
    username: &str,
    password: &str,
) -> ApiResult<AuthResponse> {
    let creds = store
        .web_credentials(username)
        .await?
        .ok_or_else(|| ApiError::unauthenticated(BAD_CREDENTIALS))?;
    if !verify_password(password, &creds.password_hash) {
        tracing::info!(username = %username, "Login failed");
        return Err(ApiError::unauthenticated(BAD_CREDENTIALS));
    }

    let user = store
        .user_get(&creds.growid)
        .await?
        .ok_or_else(|| ApiError::unauthenticated(BAD_CREDENTIALS))?;
    if !user.is_web_active {
        return Err(ApiError::forbidden("Web account is not active"));
    }
    refuse_blacklisted(store, &user.growid).await?;

    let pair = tokens.issue_with_role(&user.growid, user.role)?;
    tracing::info!(growid = %user.growid, "Login succeeded");
    Ok(AuthResponse {
        tokens: pair,
        growid: user.growid,
        role: user.role,
    })
}

/// Exchange a refresh token for a new pair.
///
/// The new pair carries the user's current role, so role changes apply on
/// the next refresh.
pub async fn refresh(
    store: &dyn ShopStore,
    tokens: &TokenService,
    refresh_token: &str,
) -> ApiResult<AuthResponse> {
    let claims = tokens.validate(refresh_token)?;
    if claims.token_type != TokenType::Refresh {
        return Err(TokenError::WrongType {
            expected: TokenType::Refresh,
            found: claims.token_type,
        }
        .into());
    }

    let user = store
        .user_get(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::invalid_token("Unknown subject"))?;
    refuse_blacklisted(store, &user.growid).await?;

    let pair = tokens.issue_with_role(&user.growid, user.role)?;
    Ok(AuthResponse {
        tokens: pair,
        growid: user.growid,
        role: user.role,
    })
}

/// Replace a user's password after checking the current one.
pub async fn change_password(
    store: &dyn ShopStore,
    growid: &str,
    old_password: &str,
    new_password: &str,
) -> ApiResult<()> {
    validate_password("new_password", new_password)?;

    let username = store
        .user_get(growid)
        .await?
        .and_then(|u| u.website_username)
        .ok_or_else(|| ApiError::not_found("web account", growid))?;
    let creds = store
        .web_credentials(&username)
        .await?
        .ok_or_else(|| ApiError::not_found("web account", growid))?;

    if !verify_password(old_password, &creds.password_hash) {
        return Err(ApiError::unauthenticated("Current password is incorrect"));
    }

    store
        .web_password_update(growid, &hash_password(new_password))
        .await?;
    tracing::info!(growid = %growid, "Password changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, SystemClock};
    use crate::error::ErrorCode;
    use lockshop_core::Currency;
    use lockshop_storage::InMemoryStore;
    use std::sync::Arc;

    fn tokens() -> TokenService {
        TokenService::new(
            AuthConfig::with_secret("account-service-test-secret", Arc::new(SystemClock))
                .expect("test secret should be valid"),
        )
    }

    fn register_req(growid: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            growid: growid.to_string(),
            username: username.to_string(),
            password: "correct-horse".to_string(),
            discord_id: Some("1234".to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() -> ApiResult<()> {
        let store = InMemoryStore::new();
        let user = register(&store, &ApiConfig::default(), &register_req("STEVE", "steve")).await?;
        assert_eq!(user.role, UserRole::Basic);
        assert!(store.user_get_by_discord("1234").await?.is_some());

        let response = login(&store, &tokens(), "steve", "correct-horse").await?;
        assert_eq!(response.growid, "STEVE");

        let err = login(&store, &tokens(), "steve", "wrong-horse")
            .await
            .expect_err("wrong password must fail");
        assert_eq!(err.code, ErrorCode::AuthenticationError);
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_promoted() -> ApiResult<()> {
        let store = InMemoryStore::new();
        let config = ApiConfig {
            admin_growids: vec!["OWNER".to_string()],
            ..ApiConfig::default()
        };
        let user = register(&store, &config, &register_req("OWNER", "owner")).await?;
        assert_eq!(user.role, UserRole::Admin);
        Ok(())
    }

    #[tokio::test]
    async fn test_blacklisted_user_cannot_login() -> ApiResult<()> {
        let store = InMemoryStore::new();
        register(&store, &ApiConfig::default(), &register_req("CHEATER", "cheater")).await?;
        store.blacklist_add("CHEATER", "OWNER", Some("scam")).await?;

        let err = login(&store, &tokens(), "cheater", "correct-horse")
            .await
            .expect_err("blacklisted login must fail");
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_uses_current_role() -> ApiResult<()> {
        let store = InMemoryStore::new();
        let tokens = tokens();
        register(&store, &ApiConfig::default(), &register_req("VIP", "vip")).await?;
        let first = login(&store, &tokens, "vip", "correct-horse").await?;
        store.user_set_role("VIP", UserRole::Premium).await?;

        let refreshed = refresh(&store, &tokens, &first.tokens.refresh_token).await?;
        assert_eq!(refreshed.role, UserRole::Premium);

        let err = refresh(&store, &tokens, &first.tokens.access_token)
            .await
            .expect_err("access token cannot refresh");
        assert_eq!(err.code, ErrorCode::InvalidTokenError);
        Ok(())
    }

    #[tokio::test]
    async fn test_change_password_checks_old_password() -> ApiResult<()> {
        let store = InMemoryStore::new();
        register(&store, &ApiConfig::default(), &register_req("STEVE", "steve")).await?;

        assert!(change_password(&store, "STEVE", "nope-nope", "new-password-1")
            .await
            .is_err());
        change_password(&store, "STEVE", "correct-horse", "new-password-1").await?;
        assert!(login(&store, &tokens(), "steve", "new-password-1").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_growid_needs_its_discord_link() -> ApiResult<()> {
        let store = InMemoryStore::new();
        store.user_create("RICH", UserRole::Basic).await?;
        store.discord_link("4242", "RICH").await?;
        store.balance_adjust("RICH", Currency::Bgl, 5).await?;

        let mut req = register_req("RICH", "thief");
        req.discord_id = None;
        let err = register(&store, &ApiConfig::default(), &req)
            .await
            .expect_err("unlinked takeover must fail");
        assert_eq!(err.code, ErrorCode::Conflict);
        assert!(login(&store, &tokens(), "thief", "correct-horse").await.is_err());

        req.username = "rich".to_string();
        req.discord_id = Some("4242".to_string());
        let user = register(&store, &ApiConfig::default(), &req).await?;
        assert_eq!(user.balance.bgl, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_linked_discord_id_cannot_be_taken() -> ApiResult<()> {
        let store = InMemoryStore::new();
        register(&store, &ApiConfig::default(), &register_req("ALICE", "alice")).await?;

        let err = register(&store, &ApiConfig::default(), &register_req("MALLORY", "mallory"))
            .await
            .expect_err("linked discord id must be refused");
        assert_eq!(err.code, ErrorCode::Conflict);
        let owner = store.user_get_by_discord("1234").await?;
        assert_eq!(owner.map(|u| u.growid), Some("ALICE".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_short_password_is_validation_error() {
        let store = InMemoryStore::new();
        let mut req = register_req("STEVE", "steve");
        req.password = "short".to_string();
        let err = register(&store, &ApiConfig::default(), &req)
            .await
            .expect_err("short password must fail");
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
