//! MCP tool implementations.
//!
//! This module contains all tools exposed by the geocensus server. Each tool
//! forwards to the shared [`QueryEngine`](geocensus_core::QueryEngine) and
//! returns its result as pretty-printed JSON text.

pub mod cache;
pub mod demographics;
pub mod reference;
pub mod spatial;

use crate::error::ServerError;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Encode a tool result as a JSON text content block.
pub(crate) fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ServerError::EncodeFailed(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
