//! Cache database connection management.
//!
//! This module handles opening the SQLite cache database through the shared
//! [`crate::sqlite`] helpers and holds the TTL policy entries are written
//! with.

use super::tier::TtlPolicy;
use crate::Error;
use crate::sqlite::{self, Migration};
use std::path::Path;
use tokio_rusqlite::Connection;

const MIGRATIONS: &[Migration] = &[(1, include_str!("../../migrations/001_cache_entries.sql"))];

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Clones share the same connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    pub(crate) ttl: TtlPolicy,
}

impl CacheDb {
    /// Open a cache database at the specified path with the default TTL policy.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = sqlite::open(path, MIGRATIONS).await?;
        Ok(Self { conn, ttl: TtlPolicy::default() })
    }

    /// Open an in-memory cache database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = sqlite::open_in_memory(MIGRATIONS).await?;
        Ok(Self { conn, ttl: TtlPolicy::default() })
    }

    /// Replace the TTL policy used for new entries.
    pub fn with_ttl_policy(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Close the underlying connection.
    ///
    /// Every clone of this handle fails with a cache error afterwards.
    pub async fn close(&self) -> Result<(), Error> {
        self.conn
            .clone()
            .close()
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_creates_table() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let exists: bool = db
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='cache_entries')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(exists);
    }

    #[tokio::test]
    async fn test_with_ttl_policy() {
        let policy = TtlPolicy { short: std::time::Duration::from_secs(1), ..Default::default() };
        let db = CacheDb::open_in_memory().await.unwrap().with_ttl_policy(policy);
        assert_eq!(db.ttl_policy().short, std::time::Duration::from_secs(1));
    }
}
