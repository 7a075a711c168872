use serde::{Deserialize, Serialize};

use crate::ratelimit::RateLimitPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redirect_server: ServerConfig,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    pub ttl_secs: u64,
}

/// Per-site rate-limit tuples. Defaults are the named policies; each number
/// can be overridden independently from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    pub credential_checks: RateLimitPolicy,
    pub api_traffic: RateLimitPolicy,
}

fn env_u32(name: &str, default: u32) -> anyhow::Result<u32> {
    match std::env::var(name) {
        Ok(v) => Ok(v.parse()?),
        Err(_) => Ok(default),
    }
}

fn env_i64(name: &str, default: i64) -> anyhow::Result<i64> {
    match std::env::var(name) {
        Ok(v) => Ok(v.parse()?),
        Err(_) => Ok(default),
    }
}

fn policy_from_env(prefix: &str, default: RateLimitPolicy) -> anyhow::Result<RateLimitPolicy> {
    Ok(RateLimitPolicy {
        max_attempts: env_u32(&format!("{prefix}_MAX_ATTEMPTS"), default.max_attempts)?,
        window_ms: env_i64(&format!("{prefix}_WINDOW_MS"), default.window_ms)?,
        block_duration_ms: env_i64(&format!("{prefix}_BLOCK_MS"), default.block_duration_ms)?,
    })
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./linklet.db".to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()?;

        let host = std::env::var("REDIRECT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("REDIRECT_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()?;

        let cache_enabled = std::env::var("CACHE_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(true);
        let cache_max_entries = std::env::var("CACHE_MAX_ENTRIES")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<u64>()?;
        let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()?;

        let rate_limits = RateLimitsConfig {
            credential_checks: policy_from_env(
                "RATE_LIMIT_CREDENTIAL",
                RateLimitPolicy::credential_checks(),
            )?,
            api_traffic: policy_from_env("RATE_LIMIT_API", RateLimitPolicy::api_traffic())?,
        };

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            redirect_server: ServerConfig { host, port },
            cache: CacheConfig {
                enabled: cache_enabled,
                max_entries: cache_max_entries,
                ttl_secs: cache_ttl_secs,
            },
            rate_limits,
        })
    }
}
