//! Structured errors for the geocensus server.
//!
//! Query errors come from `geocensus_core::Error`; these cover failures
//! that only exist at the tool boundary.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Tool-boundary errors for the geocensus server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid tool parameters (e.g., unknown operation name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A result could not be encoded for the client.
    #[error("ENCODE_FAILED: {0}")]
    EncodeFailed(String),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let (code, message) = match &err {
            ServerError::InvalidInput(_) => (-32602, err.to_string()),
            ServerError::EncodeFailed(_) => (-32603, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
