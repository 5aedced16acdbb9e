//! Configuration Module
//!
//! Handles loading process-wide memoization defaults from environment variables.

use std::env;

/// Process-wide memoization configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether call/hit statistics are collected from process start
    pub stats_enabled: bool,
    /// Default number of entries a non-identity cache keeps
    pub default_max_size: usize,
    /// Default time-to-live in milliseconds, 0 = entries never expire
    pub default_ttl_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_STATS_ENABLED` - Collect statistics (default: false)
    /// - `MEMO_DEFAULT_MAX_SIZE` - Default cache size (default: 1)
    /// - `MEMO_DEFAULT_TTL_MS` - Default time-to-live in ms (default: 0, disabled)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stats_enabled: env::var("MEMO_STATS_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stats_enabled),
            default_max_size: env::var("MEMO_DEFAULT_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.default_max_size),
            default_ttl_ms: env::var("MEMO_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_enabled: false,
            default_max_size: 1,
            default_ttl_ms: 0,
        }
    }
}
