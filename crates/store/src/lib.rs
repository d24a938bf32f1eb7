//! Reference spatial store for geocensus.
//!
//! A SQLite database of locations and demographic observations that
//! implements [`geocensus_core::SpatialBackend`], plus the batch loader the
//! scraping pipeline writes through.

mod backend;
pub mod connection;
pub mod error;
pub mod load;
pub mod predicates;

pub use connection::LocationStore;
pub use error::StoreError;
pub use load::{LoadBatch, NewObservation, derive_location_id};
