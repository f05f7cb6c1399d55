//! API Configuration Module
//!
//! Configuration for CORS, rate limiting, response caching, compression and
//! backend selection. Values are loaded from `LOCKSHOP_*` environment
//! variables with development-friendly defaults.

use lockshop_core::UserRole;
use std::net::IpAddr;
use std::time::Duration;

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// Which store backs records, rate-limit counters and cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Process memory; state is lost on restart
    #[default]
    Memory,

    /// PostgreSQL via deadpool
    Postgres,
}

impl std::str::FromStr for BackendKind {
    type Err = std::convert::Infallible;

    /// Parse backend kind (case-insensitive). Unknown values mean memory.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => BackendKind::Postgres,
            _ => BackendKind::Memory,
        })
    }
}

// ============================================================================
// PER-ROLE RATE LIMITS
// ============================================================================

/// Requests allowed per window for each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleLimits {
    pub admin: u64,
    pub premium: u64,
    pub basic: u64,
    /// Callers without a role (unauthenticated)
    pub default: u64,
}

impl Default for RoleLimits {
    fn default() -> Self {
        Self {
            admin: 1000,
            premium: 500,
            basic: 100,
            default: 100,
        }
    }
}

impl RoleLimits {
    /// Limit for a caller role; `None` is an anonymous caller.
    pub fn limit_for(&self, role: Option<UserRole>) -> u64 {
        match role {
            Some(UserRole::Admin) => self.admin,
            Some(UserRole::Premium) => self.premium,
            Some(UserRole::Basic) => self.basic,
            None => self.default,
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the request pipeline.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Fixed window length.
    pub rate_limit_window: Duration,

    pub role_limits: RoleLimits,

    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    /// Empty means anonymous callers are keyed by the socket peer only.
    pub trusted_proxies: Vec<IpAddr>,

    // ========================================================================
    // Response Cache and Compression
    // ========================================================================
    pub cache_enabled: bool,

    /// Lifetime of cached GET responses.
    pub cache_ttl: Duration,

    /// Smallest body, in bytes, that is gzip-encoded.
    pub compression_min_size: u16,

    // ========================================================================
    // Backends
    // ========================================================================
    pub backend: BackendKind,

    /// Upper bound on every limiter and cache backend call.
    pub backend_timeout: Duration,

    /// How often expired counters and cache entries are swept.
    pub sweep_interval: Duration,

    /// Growids that receive the admin role when they register.
    pub admin_growids: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            rate_limit_enabled: true,
            rate_limit_window: Duration::from_secs(3600),
            role_limits: RoleLimits::default(),
            trusted_proxies: Vec::new(),

            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            compression_min_size: 500,

            backend: BackendKind::default(),
            backend_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(60),
            admin_growids: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_ip_list(entries: &[String]) -> Vec<IpAddr> {
    entries
        .iter()
        .filter_map(|entry| match entry.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!(entry = %entry, "Ignoring invalid trusted proxy address");
                None
            }
        })
        .collect()
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| match s.to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
        .unwrap_or(default)
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LOCKSHOP_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `LOCKSHOP_CORS_ALLOW_CREDENTIALS`: default false
    /// - `LOCKSHOP_CORS_MAX_AGE_SECS`: default 86400
    /// - `LOCKSHOP_RATE_LIMIT_ENABLED`: default true
    /// - `LOCKSHOP_RATE_LIMIT_WINDOW_SECS`: default 3600
    /// - `LOCKSHOP_RATE_LIMIT_DEFAULT`: anonymous limit, default 100
    /// - `LOCKSHOP_RATE_LIMIT_ADMIN` / `_PREMIUM` / `_BASIC`: 1000 / 500 / 100
    /// - `LOCKSHOP_TRUSTED_PROXIES`: comma-separated proxy IPs allowed to set
    ///   forwarding headers (default none)
    /// - `LOCKSHOP_CACHE_ENABLED`: default true
    /// - `LOCKSHOP_CACHE_TTL_SECS`: default 300
    /// - `LOCKSHOP_COMPRESSION_MIN_SIZE`: default 500
    /// - `LOCKSHOP_BACKEND`: `memory` or `postgres` (default memory)
    /// - `LOCKSHOP_BACKEND_TIMEOUT_MS`: default 500
    /// - `LOCKSHOP_SWEEP_INTERVAL_SECS`: default 60
    /// - `LOCKSHOP_ADMIN_GROWIDS`: comma-separated growids promoted at registration
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limits = defaults.role_limits;

        Self {
            cors_origins: env_list("LOCKSHOP_CORS_ORIGINS"),
            cors_allow_credentials: env_flag("LOCKSHOP_CORS_ALLOW_CREDENTIALS", false),
            cors_max_age_secs: env_parse("LOCKSHOP_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),

            rate_limit_enabled: env_flag("LOCKSHOP_RATE_LIMIT_ENABLED", true),
            rate_limit_window: env_parse("LOCKSHOP_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            role_limits: RoleLimits {
                admin: env_parse("LOCKSHOP_RATE_LIMIT_ADMIN").unwrap_or(limits.admin),
                premium: env_parse("LOCKSHOP_RATE_LIMIT_PREMIUM").unwrap_or(limits.premium),
                basic: env_parse("LOCKSHOP_RATE_LIMIT_BASIC").unwrap_or(limits.basic),
                default: env_parse("LOCKSHOP_RATE_LIMIT_DEFAULT").unwrap_or(limits.default),
            },
            trusted_proxies: parse_ip_list(&env_list("LOCKSHOP_TRUSTED_PROXIES")),

            cache_enabled: env_flag("LOCKSHOP_CACHE_ENABLED", true),
            cache_ttl: env_parse("LOCKSHOP_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            compression_min_size: env_parse("LOCKSHOP_COMPRESSION_MIN_SIZE")
                .unwrap_or(defaults.compression_min_size),

            backend: env_parse("LOCKSHOP_BACKEND").unwrap_or_default(),
            backend_timeout: env_parse("LOCKSHOP_BACKEND_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backend_timeout),
            sweep_interval: env_parse("LOCKSHOP_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            admin_growids: env_list("LOCKSHOP_ADMIN_GROWIDS"),
        }
    }

    /// Strict CORS is configured.
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.lockshop.gg
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern))
                        || origin_domain == pattern;
                }
            }
            false
        })
    }

    /// Whether a growid is promoted to admin at registration.
    pub fn is_bootstrap_admin(&self, growid: &str) -> bool {
        self.admin_growids
            .iter()
            .any(|g| g.eq_ignore_ascii_case(growid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_window, Duration::from_secs(3600));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.compression_min_size, 500);
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn test_trusted_proxy_list_skips_garbage() {
        let entries = vec![
            "10.0.0.2".to_string(),
            "not-an-ip".to_string(),
            "::1".to_string(),
        ];
        let parsed = parse_ip_list(&entries);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].to_string(), "10.0.0.2");
    }

    #[test]
    fn test_role_limits() {
        let limits = RoleLimits::default();
        assert_eq!(limits.limit_for(Some(UserRole::Admin)), 1000);
        assert_eq!(limits.limit_for(Some(UserRole::Premium)), 500);
        assert_eq!(limits.limit_for(Some(UserRole::Basic)), 100);
        assert_eq!(limits.limit_for(None), 100);
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("Postgres".parse::<BackendKind>(), Ok(BackendKind::Postgres));
        assert_eq!("pg".parse::<BackendKind>(), Ok(BackendKind::Postgres));
        assert_eq!("memory".parse::<BackendKind>(), Ok(BackendKind::Memory));
        assert_eq!("redis".parse::<BackendKind>(), Ok(BackendKind::Memory));
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(!config.is_production());
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://lockshop.gg".to_string(),
                "*.lockshop.gg".to_string(),
            ],
            ..Default::default()
        };

        assert!(config.is_production());
        assert!(config.is_origin_allowed("https://lockshop.gg"));
        assert!(config.is_origin_allowed("https://app.lockshop.gg"));
        assert!(!config.is_origin_allowed("https://evil-lockshop.gg"));
        assert!(!config.is_origin_allowed("http://app.lockshop.gg"));
    }

    #[test]
    fn test_bootstrap_admin_match_ignores_case() {
        let config = ApiConfig {
            admin_growids: vec!["OWNER".to_string()],
            ..Default::default()
        };
        assert!(config.is_bootstrap_admin("owner"));
        assert!(!config.is_bootstrap_admin("guest"));
    }
}
