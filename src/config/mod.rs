//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::Path, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, level_filters::LevelFilter, warn};

use crate::access::{RouteEntry, RouteTable};
use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tagcache";
const ENV_PREFIX: &str = "TAGCACHE";

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub routes: RouteTable,
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

/// Load settings using the configured precedence.
///
/// Sources, lowest first: `config/default.*`, `tagcache.*` in the working
/// directory, `config_file` when given (must exist), then `TAGCACHE__*`
/// environment variables with `__` separating nested keys, for example
/// `TAGCACHE__CACHE__TTL_SECONDS=600`.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("cache.languages"),
    );

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: CacheConfig,
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            routes,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let routes = build_routes(routes)?;

        Ok(Self {
            logging,
            cache,
            routes,
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

fn build_cache_settings(mut cache: CacheConfig) -> Result<CacheConfig, LoadError> {
    if cache.ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }
    if cache.domain.trim().is_empty() {
        return Err(LoadError::invalid("cache.domain", "must not be empty"));
    }
    if cache.tags_domain.trim().is_empty() {
        return Err(LoadError::invalid("cache.tags_domain", "must not be empty"));
    }
    if cache.identity_separator.is_empty() {
        return Err(LoadError::invalid(
            "cache.identity_separator",
            "must not be empty",
        ));
    }

    cache.languages = cache
        .languages
        .iter()
        .map(|language| language.trim().to_lowercase())
        .filter(|language| !language.is_empty())
        .collect();
    if let Some(language) = cache.languages.iter().find(|language| language.len() != 2) {
        return Err(LoadError::invalid(
            "cache.languages",
            format!("`{language}` is not a two-letter code"),
        ));
    }

    cache.default_language = cache.default_language.trim().to_lowercase();
    if !cache.languages.contains(&cache.default_language) {
        return Err(LoadError::invalid(
            "cache.default_language",
            format!("`{}` is not listed in cache.languages", cache.default_language),
        ));
    }

    Ok(cache)
}

fn build_routes(routes: Vec<RouteEntry>) -> Result<RouteTable, LoadError> {
    if let Some(entry) = routes.iter().find(|entry| entry.path.trim().is_empty()) {
        return Err(LoadError::invalid(
            "routes.path",
            format!("route with empty path: {entry:?}"),
        ));
    }
    let table = RouteTable::from(routes);
    if table.is_empty() {
        warn!("no routes configured; every request will be treated as not cacheable");
    } else {
        debug!(route_count = table.len(), "loaded route table");
    }
    Ok(table)
}
