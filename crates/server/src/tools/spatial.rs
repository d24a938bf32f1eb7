//! Spatial query tools: geo_nearby, geo_within, geo_containing.

use super::json_result;
use geocensus_core::QueryEngine;
use geocensus_core::query::request::{ContainingRequest, NearbyRequest, WithinRequest};
use rmcp::{ErrorData as McpError, model::CallToolResult};

/// Locations within a radius, nearest first.
pub async fn nearby_impl(engine: &QueryEngine, params: NearbyRequest) -> Result<CallToolResult, McpError> {
    let rows = engine.nearby(&params).await?;
    json_result(&rows)
}

/// Locations intersecting a polygon, by location ID.
pub async fn within_impl(engine: &QueryEngine, params: WithinRequest) -> Result<CallToolResult, McpError> {
    let rows = engine.within(&params).await?;
    json_result(&rows)
}

/// Regions containing a point, smallest first.
pub async fn containing_impl(engine: &QueryEngine, params: ContainingRequest) -> Result<CallToolResult, McpError> {
    let rows = engine.containing(&params).await?;
    json_result(&rows)
}
