//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (GEOCENSUS_*)
//! 2. TOML config file (if GEOCENSUS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::TtlPolicy;
use crate::query::QueryLimits;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (GEOCENSUS_*)
/// 2. TOML config file (if GEOCENSUS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache database.
    ///
    /// Set via GEOCENSUS_CACHE_DB_PATH environment variable.
    #[serde(default = "default_cache_db_path")]
    pub cache_db_path: PathBuf,

    /// Path to the SQLite location store.
    ///
    /// Set via GEOCENSUS_STORE_DB_PATH environment variable.
    /// Required to serve queries.
    #[serde(default)]
    pub store_db_path: Option<PathBuf>,

    /// Bound on every spatial store call, in milliseconds.
    ///
    /// Set via GEOCENSUS_UPSTREAM_TIMEOUT_MS environment variable.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// TTL of spatial query results, in seconds.
    #[serde(default = "default_short_ttl_secs")]
    pub short_ttl_secs: u64,

    /// TTL of per-location reads, in seconds.
    #[serde(default = "default_medium_ttl_secs")]
    pub medium_ttl_secs: u64,

    /// TTL of reference data, in seconds.
    #[serde(default = "default_long_ttl_secs")]
    pub long_ttl_secs: u64,

    /// Result limit for `nearby` when the caller gives none.
    #[serde(default = "default_nearby_limit")]
    pub nearby_default_limit: usize,

    /// Result limit for `within` when the caller gives none.
    #[serde(default = "default_within_limit")]
    pub within_default_limit: usize,
}

fn default_cache_db_path() -> PathBuf {
    PathBuf::from("./geocensus-cache.sqlite")
}

fn default_upstream_timeout_ms() -> u64 {
    5_000
}

fn default_short_ttl_secs() -> u64 {
    300
}

fn default_medium_ttl_secs() -> u64 {
    1_800
}

fn default_long_ttl_secs() -> u64 {
    21_600
}

fn default_nearby_limit() -> usize {
    20
}

fn default_within_limit() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_db_path: default_cache_db_path(),
            store_db_path: None,
            upstream_timeout_ms: default_upstream_timeout_ms(),
            short_ttl_secs: default_short_ttl_secs(),
            medium_ttl_secs: default_medium_ttl_secs(),
            long_ttl_secs: default_long_ttl_secs(),
            nearby_default_limit: default_nearby_limit(),
            within_default_limit: default_within_limit(),
        }
    }
}

impl AppConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            short: Duration::from_secs(self.short_ttl_secs),
            medium: Duration::from_secs(self.medium_ttl_secs),
            long: Duration::from_secs(self.long_ttl_secs),
        }
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits { nearby_default: self.nearby_default_limit, within_default: self.within_default_limit }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `GEOCENSUS_`
    /// 2. TOML file from `GEOCENSUS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("GEOCENSUS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("GEOCENSUS_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Location store path (deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no store path is configured.
    pub fn require_store_db_path(&self) -> Result<&PathBuf, ConfigError> {
        self.store_db_path.as_ref().ok_or_else(|| ConfigError::Missing {
            field: "store_db_path".into(),
            hint: "Set GEOCENSUS_STORE_DB_PATH environment variable".into(),
        })
    }
}
