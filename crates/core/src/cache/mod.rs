//! Query-result cache.
//!
//! This module provides the SQLite-backed TTL cache the query orchestrator
//! reads through. It supports:
//!
//! - Deterministic keys derived from canonicalized query parameters
//! - Three TTL tiers (short, medium, long)
//! - Prefix invalidation when new data is loaded
//! - Lazy expiry on read plus explicit purging

pub mod connection;
pub mod entries;
pub mod key;
pub mod store;
pub mod tier;

pub use crate::Error;

pub use connection::CacheDb;
pub use key::Operation;
pub use store::CacheStore;
pub use tier::{CacheTier, TtlPolicy};
