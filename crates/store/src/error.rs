//! Location store errors.

use geocensus_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("store database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// Opening the database or applying migrations failed.
    #[error("store setup failed: {0}")]
    Setup(#[from] Error),

    /// A persisted geometry no longer decodes.
    #[error("stored geometry for {location_id} is invalid: {reason}")]
    CorruptGeometry { location_id: String, reason: String },

    /// A persisted location category is unknown.
    #[error("stored location {location_id} has unknown type {kind}")]
    CorruptKind { location_id: String, kind: String },

    /// A location or observation in a load batch was rejected.
    #[error("invalid load record: {0}")]
    InvalidRecord(String),
}

impl From<tokio_rusqlite::rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::rusqlite::Error) -> Self {
        StoreError::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidRecord(msg) => Error::InvalidArgument(msg),
            StoreError::Setup(e) if !e.is_cache_failure() => e,
            other => Error::UpstreamUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_surface_as_upstream() {
        let err: Error = StoreError::Database(tokio_rusqlite::Error::ConnectionClosed).into();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
        assert!(!err.is_cache_failure());

        let err: Error = StoreError::Setup(Error::MigrationFailed("version 2".into())).into();
        assert!(matches!(err, Error::UpstreamUnavailable(msg) if msg.contains("version 2")));
    }

    #[test]
    fn test_invalid_record_is_invalid_argument() {
        let err: Error = StoreError::InvalidRecord("empty location_id".into()).into();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
