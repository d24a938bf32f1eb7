//! Cache entry operations.
//!
//! Expiry is stored as Unix milliseconds and checked on every read, so an
//! expired row is never returned even before it is purged.

use super::connection::CacheDb;
use super::tier::CacheTier;
use crate::Error;
use chrono::Utc;
use std::time::Duration;
use tokio_rusqlite::params;

impl CacheDb {
    /// Get a live cached value by key.
    ///
    /// Returns None if the key doesn't exist or has expired.
    pub async fn get_entry(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM cache_entries WHERE key = ?1 AND expires_at_ms > ?2")?;

                let result = stmt.query_row(params![key, now], |row| row.get(0));

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a cached value with an explicit TTL.
    pub async fn put_entry(&self, key: &str, value: &str, tier: CacheTier, ttl: Duration) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now();
        let created_at = now.to_rfc3339();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = now.timestamp_millis().saturating_add(ttl_ms);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (key, value, tier, created_at, expires_at_ms)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        tier = excluded.tier,
                        created_at = excluded.created_at,
                        expires_at_ms = excluded.expires_at_ms",
                    params![key, value, tier.as_str(), created_at, expires_at_ms],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry whose key starts with `prefix`.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                    params![prefix],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a single entry. Returns whether it existed.
    pub async fn delete_entry(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_entries(&self) -> Result<u64, Error> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE expires_at_ms <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Round-trip a trivial query to confirm the connection is alive.
    pub async fn ping(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
