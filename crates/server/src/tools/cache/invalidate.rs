//! cache_invalidate tool implementation.
//!
//! Invalidates cached results by operation, by location, or all at once.

use crate::error::ServerError;
use crate::tools::json_result;
use geocensus_core::cache::key::Operation;
use geocensus_core::QueryEngine;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    /// Operations whose results to drop: nearby, within, containing,
    /// indicators, timeseries, compare, location_types, bounding_box,
    /// location, demographics, locations, categories, years.
    pub operations: Option<Vec<String>>,

    /// Locations whose per-location results (detail, demographics,
    /// indicators, time series) to drop. Comparisons are dropped as well.
    pub location_ids: Option<Vec<String>>,

    /// Drop every cached result.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateOutput {
    /// Number of entries removed.
    pub removed: u64,
}

/// Implementation of the cache_invalidate tool.
pub async fn invalidate_impl(engine: &QueryEngine, params: CacheInvalidateParams) -> Result<CallToolResult, McpError> {
    if params.all {
        let removed = engine.invalidate_all().await?;
        return json_result(&CacheInvalidateOutput { removed });
    }

    let operations = params
        .operations
        .unwrap_or_default()
        .iter()
        .map(|name| {
            Operation::from_name(name.trim())
                .ok_or_else(|| ServerError::InvalidInput(format!("unknown operation '{name}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let location_ids = params.location_ids.unwrap_or_default();

    if operations.is_empty() && location_ids.is_empty() {
        return Err(ServerError::InvalidInput(
            "At least one of operations, location_ids, or all must be specified".to_string(),
        )
        .into());
    }

    let mut removed = 0;
    if !operations.is_empty() {
        removed += engine.invalidate(&operations).await?;
    }
    if !location_ids.is_empty() {
        removed += engine.invalidate_locations(&location_ids).await?;
    }

    json_result(&CacheInvalidateOutput { removed })
}
