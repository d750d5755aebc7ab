//! Configuration layer: typed settings with layered precedence (file → env).

use std::{num::NonZeroU32, path::Path, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "plaudit";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_LIST_LIMIT: usize = 256;
const DEFAULT_CACHE_SEARCH_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_RANKING_TTL_SECS: u64 = 600;
const DEFAULT_CACHE_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CACHE_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_MIN_REVIEWS_FOR_TOP_RATED: i64 = 3;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_list_cache: bool,
    pub list_limit: usize,
    pub search_ttl_secs: u64,
    pub ranking_ttl_secs: u64,
    pub auto_consume_interval_ms: u64,
    pub consume_batch_limit: usize,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub min_reviews_for_top_rated: i64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
///
/// An explicit `config_file` is required to exist; the default basenames are
/// optional so a bare checkout runs on defaults alone.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PLAUDIT").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    catalog: RawCatalogSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            catalog,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let catalog = build_catalog_settings(catalog)?;

        Ok(Self {
            logging,
            database,
            cache,
            catalog,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let enable_list_cache = cache.enable_list_cache.unwrap_or(true);

    let list_limit = cache.list_limit.unwrap_or(DEFAULT_CACHE_LIST_LIMIT);
    if list_limit == 0 {
        return Err(LoadError::invalid(
            "cache.list_limit",
            "must be greater than zero",
        ));
    }

    let search_ttl_secs = cache
        .search_ttl_secs
        .unwrap_or(DEFAULT_CACHE_SEARCH_TTL_SECS);
    if search_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.search_ttl_secs",
            "must be greater than zero",
        ));
    }

    let ranking_ttl_secs = cache
        .ranking_ttl_secs
        .unwrap_or(DEFAULT_CACHE_RANKING_TTL_SECS);
    if ranking_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.ranking_ttl_secs",
            "must be greater than zero",
        ));
    }

    let auto_consume_interval_ms = cache
        .auto_consume_interval_ms
        .unwrap_or(DEFAULT_CACHE_AUTO_CONSUME_INTERVAL_MS);
    if auto_consume_interval_ms == 0 {
        return Err(LoadError::invalid(
            "cache.auto_consume_interval_ms",
            "must be greater than zero",
        ));
    }

    let consume_batch_limit = cache
        .consume_batch_limit
        .unwrap_or(DEFAULT_CACHE_CONSUME_BATCH_LIMIT);
    if consume_batch_limit == 0 {
        return Err(LoadError::invalid(
            "cache.consume_batch_limit",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enable_list_cache,
        list_limit,
        search_ttl_secs,
        ranking_ttl_secs,
        auto_consume_interval_ms,
        consume_batch_limit,
    })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> Result<CatalogSettings, LoadError> {
    let min_reviews_for_top_rated = catalog
        .min_reviews_for_top_rated
        .unwrap_or(DEFAULT_MIN_REVIEWS_FOR_TOP_RATED);
    if min_reviews_for_top_rated < 0 {
        return Err(LoadError::invalid(
            "catalog.min_reviews_for_top_rated",
            "must not be negative",
        ));
    }

    Ok(CatalogSettings {
        min_reviews_for_top_rated,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_list_cache: Option<bool>,
    list_limit: Option<usize>,
    search_ttl_secs: Option<u64>,
    ranking_ttl_secs: Option<u64>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    min_reviews_for_top_rated: Option<i64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
