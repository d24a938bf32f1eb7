//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::query::{MAX_NEARBY_LIMIT, MAX_WITHIN_LIMIT};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_db_path` is empty
    /// - `upstream_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - any TTL is 0
    /// - a default limit is outside its query's accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "cache_db_path".into(), reason: "must not be empty".into() });
        }
        if let Some(path) = &self.store_db_path
            && path.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid { field: "store_db_path".into(), reason: "must not be empty".into() });
        }

        if self.upstream_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "upstream_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.upstream_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "upstream_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        for (field, secs) in [
            ("short_ttl_secs", self.short_ttl_secs),
            ("medium_ttl_secs", self.medium_ttl_secs),
            ("long_ttl_secs", self.long_ttl_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be greater than 0".into() });
            }
        }

        if !(1..=MAX_NEARBY_LIMIT).contains(&self.nearby_default_limit) {
            return Err(ConfigError::Invalid {
                field: "nearby_default_limit".into(),
                reason: format!("must be between 1 and {MAX_NEARBY_LIMIT}"),
            });
        }
        if !(1..=MAX_WITHIN_LIMIT).contains(&self.within_default_limit) {
            return Err(ConfigError::Invalid {
                field: "within_default_limit".into(),
                reason: format!("must be between 1 and {MAX_WITHIN_LIMIT}"),
            });
        }

        if !(self.short_ttl_secs <= self.medium_ttl_secs && self.medium_ttl_secs <= self.long_ttl_secs) {
            tracing::warn!(
                short = self.short_ttl_secs,
                medium = self.medium_ttl_secs,
                long = self.long_ttl_secs,
                "TTL tiers are not ordered short <= medium <= long; \
                 spatial results may outlive reference data"
            );
        }

        Ok(())
    }
}
