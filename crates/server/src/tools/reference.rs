//! Reference tools: location listings, categories, years, location_types,
//! bounding_box, health.

use super::json_result;
use geocensus_core::QueryEngine;
use geocensus_core::query::request::{BoundingBoxRequest, LocationRequest, LocationsRequest};
use rmcp::{ErrorData as McpError, model::CallToolResult};

pub async fn list_locations_impl(engine: &QueryEngine, params: LocationsRequest) -> Result<CallToolResult, McpError> {
    let locations = engine.locations(&params).await?;
    json_result(&locations)
}

pub async fn get_location_impl(engine: &QueryEngine, params: LocationRequest) -> Result<CallToolResult, McpError> {
    let location = engine.location(&params).await?;
    json_result(&location)
}

pub async fn demographic_categories_impl(engine: &QueryEngine) -> Result<CallToolResult, McpError> {
    let categories = engine.demographic_categories().await?;
    json_result(&categories)
}

pub async fn years_impl(engine: &QueryEngine) -> Result<CallToolResult, McpError> {
    let years = engine.years().await?;
    json_result(&years)
}

/// Implementation of the location_types tool.
pub async fn location_types_impl(engine: &QueryEngine) -> Result<CallToolResult, McpError> {
    let kinds = engine.location_types().await?;
    json_result(&kinds)
}

/// Implementation of the bounding_box tool.
///
/// Falls back to the continental US when no stored location matches.
pub async fn bounding_box_impl(engine: &QueryEngine, params: BoundingBoxRequest) -> Result<CallToolResult, McpError> {
    let bbox = engine.bounding_box(&params).await?;
    json_result(&bbox)
}

/// Implementation of the health tool. Never fails on an unreachable
/// dependency; the report carries the status instead.
pub async fn health_impl(engine: &QueryEngine) -> Result<CallToolResult, McpError> {
    let report = engine.health().await;
    json_result(&report)
}
