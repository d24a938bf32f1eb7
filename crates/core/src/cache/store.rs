//! The cache store seam used by the query orchestrator.

use super::connection::CacheDb;
use super::tier::CacheTier;
use crate::Error;
use async_trait::async_trait;

/// TTL-bounded key/value store with prefix invalidation.
///
/// Every method may fail with a cache error (see
/// [`Error::is_cache_failure`]); callers treat such failures as a reason to
/// bypass the cache, never to fail the request.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value for `key`, or None on a miss or an expired entry.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `value` under `key` with the TTL of `tier`.
    async fn set(&self, key: &str, value: &str, tier: CacheTier) -> Result<(), Error>;

    /// Remove every entry whose key begins with `prefix`.
    async fn invalidate_by_prefix(&self, prefix: &str) -> Result<u64, Error>;

    /// Remove a single entry.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// Physically remove expired entries.
    async fn purge_expired(&self) -> Result<u64, Error>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), Error>;

    /// End the store's lifecycle.
    async fn close(&self) -> Result<(), Error>;
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.get_entry(key).await
    }

    async fn set(&self, key: &str, value: &str, tier: CacheTier) -> Result<(), Error> {
        let ttl = self.ttl.ttl(tier);
        self.put_entry(key, value, tier, ttl).await
    }

    async fn invalidate_by_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let deleted = self.delete_prefix(prefix).await?;
        tracing::info!(prefix, deleted, "invalidated cache entries");
        Ok(deleted)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.delete_entry(key).await
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        self.purge_expired_entries().await
    }

    async fn ping(&self) -> Result<(), Error> {
        CacheDb::ping(self).await
    }

    async fn close(&self) -> Result<(), Error> {
        CacheDb::close(self).await
    }
}
