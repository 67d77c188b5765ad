//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;
use crate::storage::StorageKind;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage backend
    pub storage: StorageKind,
    /// Default lifetime in milliseconds for entries without an explicit one; 0 = never expire
    pub default_expiration_ms: u64,
    /// Janitor sweep interval in milliseconds; 0 disables the janitor
    pub cleanup_interval_ms: u64,
    /// Size of the refresh worker pool; 0 disables refresh
    pub refresh_workers: usize,
    /// Connection URL used when `storage` is Redis
    pub redis_url: String,
    /// Key of the distributed write lock used when `storage` is Redis
    pub redis_lock_key: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_STORAGE` - `memory` or `redis` (default: memory)
    /// - `CACHE_DEFAULT_EXPIRATION_MS` - Default entry lifetime (default: 0, never)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Janitor frequency (default: 1000)
    /// - `CACHE_REFRESH_WORKERS` - Refresh workers (default: 4)
    /// - `CACHE_REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379/0)
    /// - `CACHE_REDIS_LOCK_KEY` - Redis lock key (default: refresh_cache:lock)
    ///
    /// Unparsable numbers fall back to their default. An unknown storage
    /// name is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let storage = match lookup("CACHE_STORAGE") {
            Some(name) => name.parse()?,
            None => defaults.storage,
        };

        Ok(Self {
            storage,
            default_expiration_ms: parse_or(
                lookup("CACHE_DEFAULT_EXPIRATION_MS"),
                defaults.default_expiration_ms,
            ),
            cleanup_interval_ms: parse_or(
                lookup("CACHE_CLEANUP_INTERVAL_MS"),
                defaults.cleanup_interval_ms,
            ),
            refresh_workers: parse_or(lookup("CACHE_REFRESH_WORKERS"), defaults.refresh_workers),
            redis_url: lookup("CACHE_REDIS_URL").unwrap_or(defaults.redis_url),
            redis_lock_key: lookup("CACHE_REDIS_LOCK_KEY").unwrap_or(defaults.redis_lock_key),
        })
    }

    /// Default entry lifetime, None when entries never expire by default.
    pub fn default_expiration(&self) -> Option<Duration> {
        non_zero_ms(self.default_expiration_ms)
    }

    /// Janitor interval, None when the janitor is disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        non_zero_ms(self.cleanup_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::Memory,
            default_expiration_ms: 0,
            cleanup_interval_ms: 1000,
            refresh_workers: 4,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            redis_lock_key: "refresh_cache:lock".to_string(),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
