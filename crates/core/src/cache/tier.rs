//! TTL tiers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL class of a cache entry, chosen by how volatile its query is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Spatial query results.
    Short,
    /// Per-location demographic detail.
    Medium,
    /// Reference data such as category lists.
    Long,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Short => "short",
            CacheTier::Medium => "medium",
            CacheTier::Long => "long",
        }
    }
}

/// Expiry applied to each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5 * 60),
            medium: Duration::from_secs(30 * 60),
            long: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl TtlPolicy {
    pub fn ttl(&self, tier: CacheTier) -> Duration {
        match tier {
            CacheTier::Short => self.short,
            CacheTier::Medium => self.medium,
            CacheTier::Long => self.long,
        }
    }
}
