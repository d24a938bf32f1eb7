//! Core types and query engine for geocensus.
//!
//! This crate provides:
//! - Validated geometry and location data model
//! - Cache key codec and SQLite-backed TTL cache
//! - Spatial predicate gateway contract
//! - Query orchestrator with single-flight cache population
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod geometry;
pub mod indicators;
pub mod model;
pub mod query;
pub mod sqlite;

pub use cache::{CacheDb, CacheStore};
pub use config::AppConfig;
pub use error::Error;
pub use gateway::{PredicateGateway, SpatialBackend};
pub use query::{DataLoadEvent, QueryEngine};
