//! Unified error types for geocensus.
//!
//! Every variant is recoverable from the caller's point of view. The
//! upper-case prefix in each message is the stable error code surfaced to
//! query-surface clients.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the geospatial query subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or out-of-range coordinates, or a degenerate polygon.
    #[error("INVALID_GEOMETRY: {0}")]
    InvalidGeometry(String),

    /// Bad type filter, bad limit, or missing required parameter.
    #[error("INVALID_ARGUMENT: {0}")]
    InvalidArgument(String),

    /// The requested location or series does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// The external spatial store could not be reached or timed out.
    #[error("UPSTREAM_UNAVAILABLE: {0}")]
    UpstreamUnavailable(String),

    /// The cache store could not be reached.
    #[error("CACHE_UNAVAILABLE: {0}")]
    CacheUnavailable(String),

    /// Cache database operation failed.
    #[error("CACHE_UNAVAILABLE: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_UNAVAILABLE: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether this error originated in the cache layer.
    ///
    /// Cache failures degrade latency only; the orchestrator bypasses the
    /// cache when it sees one.
    pub fn is_cache_failure(&self) -> bool {
        matches!(self, Error::CacheUnavailable(_) | Error::Database(_) | Error::MigrationFailed(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidGeometry(msg) => (-32602, msg.clone()),
            Error::InvalidArgument(msg) => (-32602, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::UpstreamUnavailable(msg) => (-32003, msg.clone()),
            Error::CacheUnavailable(msg) => (-32002, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
