//! Demographic read tools: demographics, latest_indicators, time_series,
//! compare_locations.

use super::json_result;
use geocensus_core::QueryEngine;
use geocensus_core::query::request::{CompareRequest, DemographicsRequest, LatestIndicatorsRequest, TimeSeriesRequest};
use rmcp::{ErrorData as McpError, model::CallToolResult};

/// Implementation of the demographics tool. Rows come back in load order.
pub async fn demographics_impl(engine: &QueryEngine, params: DemographicsRequest) -> Result<CallToolResult, McpError> {
    let observations = engine.demographics(&params).await?;
    json_result(&observations)
}

pub async fn latest_indicators_impl(
    engine: &QueryEngine, params: LatestIndicatorsRequest,
) -> Result<CallToolResult, McpError> {
    let snapshot = engine.latest_indicators(&params).await?;
    json_result(&snapshot)
}

pub async fn time_series_impl(engine: &QueryEngine, params: TimeSeriesRequest) -> Result<CallToolResult, McpError> {
    let series = engine.time_series(&params).await?;
    json_result(&series)
}

pub async fn compare_impl(engine: &QueryEngine, params: CompareRequest) -> Result<CallToolResult, McpError> {
    let comparison = engine.compare(&params).await?;
    json_result(&comparison)
}
