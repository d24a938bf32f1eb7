//! cache_purge tool implementation.
//!
//! Physically removes expired entries. Expired entries are already invisible
//! to reads, so this only reclaims space.

use crate::tools::json_result;
use geocensus_core::QueryEngine;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(engine: &QueryEngine) -> Result<CallToolResult, McpError> {
    let deleted = engine.purge_expired().await?;
    json_result(&CachePurgeOutput { deleted })
}
