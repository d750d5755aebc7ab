//! Cache configuration.
//!
//! Controls the query-result list cache and its invalidation loop via
//! `plaudit.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_LIST_LIMIT: usize = 256;
const DEFAULT_SEARCH_TTL_SECS: u64 = 300;
const DEFAULT_RANKING_TTL_SECS: u64 = 600;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// Cache configuration from `plaudit.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the query-result list cache.
    pub enable_list_cache: bool,
    /// Maximum cached id lists before LRU eviction.
    pub list_limit: usize,
    /// Time-to-live for search result lists, in seconds.
    pub search_ttl_secs: u64,
    /// Time-to-live for popularity/rating ranking lists, in seconds.
    pub ranking_ttl_secs: u64,
    /// Auto-consume interval (ms) for events published without immediate
    /// consumption.
    pub auto_consume_interval_ms: u64,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_list_cache: true,
            list_limit: DEFAULT_LIST_LIMIT,
            search_ttl_secs: DEFAULT_SEARCH_TTL_SECS,
            ranking_ttl_secs: DEFAULT_RANKING_TTL_SECS,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_list_cache: settings.enable_list_cache,
            list_limit: settings.list_limit,
            search_ttl_secs: settings.search_ttl_secs,
            ranking_ttl_secs: settings.ranking_ttl_secs,
            auto_consume_interval_ms: settings.auto_consume_interval_ms,
            consume_batch_limit: settings.consume_batch_limit,
        }
    }
}

impl CacheConfig {
    /// Returns true if the list cache is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_list_cache
    }

    /// Returns the list limit as NonZeroUsize, clamping to 1 if zero.
    pub fn list_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.list_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn ranking_ttl(&self) -> Duration {
        Duration::from_secs(self.ranking_ttl_secs)
    }
}
