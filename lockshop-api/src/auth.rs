//! Token Service
//!
//! Issues and validates the signed, time-bound bearer tokens used by the
//! API. Every login produces an access token (minutes) and a refresh token
//! (days), both HS256-signed with the same secret and tagged with their
//! type. There is no server-side revocation list.
//!
//! Time checks are done here against an injected [`JwtClock`] instead of by
//! `jsonwebtoken`, so expiry is deterministic under test.

use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lockshop_core::UserRole;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Minimum secret length accepted in production.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock for token time validation.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

/// Test clock helpers for common scenarios.
#[cfg(test)]
pub mod test_clocks {
    use super::FixedClock;

    /// 2024-01-01 00:00:00 UTC
    pub fn valid() -> FixedClock {
        FixedClock(1704067200)
    }

    /// 2020-01-01 00:00:00 UTC
    pub fn expired() -> FixedClock {
        FixedClock(1577836800)
    }

    /// 2030-01-01 00:00:00 UTC
    pub fn future() -> FixedClock {
        FixedClock(1893456000)
    }
}

// ============================================================================
// JWT SECRET
// ============================================================================

/// Signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Wrap a secret. Empty secrets are rejected.
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.is_empty() {
            return Err(ApiError::internal());
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value for signing and verification only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

fn build_jwt_secret(secret_str: String) -> JwtSecret {
    let normalized = if secret_str.trim().is_empty() {
        INSECURE_DEFAULT_SECRET.to_string()
    } else {
        secret_str
    };

    match JwtSecret::new(normalized) {
        Ok(secret) => secret,
        Err(_) => JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into())),
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Token service configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Signing secret
    pub jwt_secret: JwtSecret,

    /// Signing algorithm (default: HS256)
    pub jwt_algorithm: Algorithm,

    /// Access token lifetime in minutes (default: 30)
    pub access_ttl_minutes: i64,

    /// Refresh token lifetime in days (default: 7)
    pub refresh_ttl_days: i64,

    /// Seconds past `exp` a token is still accepted (default: 0)
    pub clock_skew_secs: i64,

    /// Clock for time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let secret_str = std::env::var("LOCKSHOP_JWT_SECRET")
            .unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
            clock_skew_secs: 0,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create token configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `LOCKSHOP_JWT_SECRET`: signing secret
    /// - `LOCKSHOP_ACCESS_TOKEN_MINUTES`: access token lifetime (default: 30)
    /// - `LOCKSHOP_REFRESH_TOKEN_DAYS`: refresh token lifetime (default: 7)
    /// - `LOCKSHOP_JWT_CLOCK_SKEW_SECS`: expiry tolerance (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            access_ttl_minutes: std::env::var("LOCKSHOP_ACCESS_TOKEN_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.access_ttl_minutes),
            refresh_ttl_days: std::env::var("LOCKSHOP_REFRESH_TOKEN_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.refresh_ttl_days),
            clock_skew_secs: std::env::var("LOCKSHOP_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.clock_skew_secs),
            ..defaults
        }
    }

    /// Config with a given secret and clock, other fields default.
    pub fn with_secret(secret: &str, clock: Arc<dyn JwtClock>) -> ApiResult<Self> {
        Ok(Self {
            jwt_secret: JwtSecret::new(secret.to_string())?,
            jwt_algorithm: Algorithm::HS256,
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
            clock_skew_secs: 0,
            clock,
        })
    }

    /// Refuse insecure secrets in production; warn about them elsewhere.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("LOCKSHOP_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();
        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                tracing::error!(
                    environment = %environment,
                    "Refusing to start in production with the default JWT secret; set LOCKSHOP_JWT_SECRET"
                );
                return Err(ApiError::service_unavailable("Insecure JWT secret"));
            }
            tracing::warn!(
                "Using the insecure default JWT secret. Set LOCKSHOP_JWT_SECRET \
                 to a random value of at least 32 characters before deploying."
            );
        }

        if self.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            if is_production {
                tracing::error!(
                    secret_len = self.jwt_secret.len(),
                    "JWT secret too short for production"
                );
                return Err(ApiError::service_unavailable("JWT secret too short"));
            } else if !self.jwt_secret.is_insecure_default() {
                tracing::warn!(
                    secret_len = self.jwt_secret.len(),
                    "JWT secret is short; use at least 32 characters in production"
                );
            }
        }

        Ok(())
    }
}

// ============================================================================
// CLAIMS AND ERRORS
// ============================================================================

/// Token type tag carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (growid)
    pub sub: String,

    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Role at issue time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Parsed role claim. Missing or unknown roles read as basic.
    pub fn user_role(&self) -> UserRole {
        self.role
            .as_deref()
            .and_then(|r| UserRole::from_db_str(r).ok())
            .unwrap_or_default()
    }
}

/// Token validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("expected {expected} token, got {found}")]
    WrongType { expected: TokenType, found: TokenType },

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Access and refresh tokens issued together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Authenticated caller attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub growid: String,
    pub role: UserRole,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            growid: claims.sub.clone(),
            role: claims.user_role(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Fail with 403 unless the caller is an admin.
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::admin_required())
        }
    }
}

// ============================================================================
// TOKEN SERVICE
// ============================================================================

/// Issues and validates bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenService {
    config: AuthConfig,
}

impl TokenService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issue an access/refresh pair without a role claim.
    pub fn issue(&self, subject: &str) -> Result<TokenPair, TokenError> {
        self.issue_pair(subject, None)
    }

    /// Issue an access/refresh pair carrying a role claim.
    pub fn issue_with_role(&self, subject: &str, role: UserRole) -> Result<TokenPair, TokenError> {
        self.issue_pair(subject, Some(role.as_db_str().to_string()))
    }

    /// Check signature, structure and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let decoding_key = DecodingKey::from_secret(self.config.jwt_secret.expose().as_bytes());

        // Signature and structure only; time is checked against our clock
        let mut validation = Validation::new(self.config.jwt_algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?
            .claims;

        let now = self.config.clock.now_epoch_secs();
        if now < 0 {
            return Err(TokenError::Malformed("clock reads before epoch".to_string()));
        }
        if now >= claims.exp.saturating_add(self.config.clock_skew_secs) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Validate and require an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.validate(token)?;
        expect_type(&claims, TokenType::Access)?;
        Ok(claims)
    }

    /// Exchange a refresh token for a new pair for the same subject.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.validate(refresh_token)?;
        expect_type(&claims, TokenType::Refresh)?;
        self.issue_pair(&claims.sub, claims.role)
    }

    fn issue_pair(&self, subject: &str, role: Option<String>) -> Result<TokenPair, TokenError> {
        let access_secs = self.config.access_ttl_minutes.saturating_mul(60);
        let refresh_secs = self.config.refresh_ttl_days.saturating_mul(86_400);

        Ok(TokenPair {
            access_token: self.sign(subject, TokenType::Access, role.clone(), access_secs)?,
            refresh_token: self.sign(subject, TokenType::Refresh, role, refresh_secs)?,
            token_type: "bearer".to_string(),
            expires_in: access_secs,
        })
    }

    fn sign(
        &self,
        subject: &str,
        token_type: TokenType,
        role: Option<String>,
        lifetime_secs: i64,
    ) -> Result<String, TokenError> {
        let now = self.config.clock.now_epoch_secs();
        let claims = Claims {
            sub: subject.to_string(),
            token_type,
            role,
            iat: now,
            exp: now.saturating_add(lifetime_secs),
        };

        let encoding_key = EncodingKey::from_secret(self.config.jwt_secret.expose().as_bytes());
        encode(&Header::new(self.config.jwt_algorithm), &claims, &encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

fn expect_type(claims: &Claims, expected: TokenType) -> Result<(), TokenError> {
    if claims.token_type == expected {
        Ok(())
    } else {
        Err(TokenError::WrongType {
            expected,
            found: claims.token_type,
        })
    }
}

/// Bearer token from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
