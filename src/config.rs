use crate::cache::{CacheSettings, DEFAULT_PREFIX};
use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Upper bound for `CACHE_TTL_SECS` (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Server
    pub port: u16,
    pub api_key: Option<String>,

    // Cache
    pub cache_ttl_secs: u64,
    pub cache_prefix: String,

    // Export
    pub export_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            // Database
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),

            // Server
            port: env_or("PORT", 8080),
            api_key: std::env::var("API_KEY").ok().filter(|key| !key.is_empty()),

            // Cache
            cache_ttl_secs: env_or("CACHE_TTL_SECS", 3600),
            cache_prefix: std::env::var("CACHE_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string()),

            // Export
            export_timeout_secs: env_or("EXPORT_TIMEOUT_SECS", 30),
        };

        if config.cache_ttl_secs == 0 {
            bail!("CACHE_TTL_SECS must be greater than zero");
        }
        if config.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            bail!(
                "CACHE_TTL_SECS must not exceed {} (30 days), got {}",
                MAX_CACHE_TTL_SECS,
                config.cache_ttl_secs
            );
        }

        Ok(config)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            prefix: self.cache_prefix.clone(),
        }
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}
