//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{CacheInvalidateParams, invalidate_impl, purge_impl};
use crate::tools::demographics::{compare_impl, demographics_impl, latest_indicators_impl, time_series_impl};
use crate::tools::reference::{
    bounding_box_impl, demographic_categories_impl, get_location_impl, health_impl, list_locations_impl,
    location_types_impl, years_impl,
};
use crate::tools::spatial::{containing_impl, nearby_impl, within_impl};

use geocensus_core::QueryEngine;
use geocensus_core::query::request::{
    BoundingBoxRequest, CompareRequest, ContainingRequest, DemographicsRequest, LatestIndicatorsRequest,
    LocationRequest, LocationsRequest, NearbyRequest, TimeSeriesRequest, WithinRequest,
};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use std::sync::Arc;

/// The main MCP server handler for geocensus.
#[derive(Clone)]
pub struct GeocensusServer {
    engine: Arc<QueryEngine>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl GeocensusServer {
    /// Create a new server handler over a shared query engine.
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Find locations within a radius of a point, nearest first. Distances are geodesic meters; the radius defaults to 10 km."
    )]
    async fn geo_nearby(&self, params: Parameters<NearbyRequest>) -> Result<CallToolResult, McpError> {
        nearby_impl(&self.engine, params.0).await
    }

    #[tool(description = "Find locations whose geometry intersects a polygon, ordered by location ID.")]
    async fn geo_within(&self, params: Parameters<WithinRequest>) -> Result<CallToolResult, McpError> {
        within_impl(&self.engine, params.0).await
    }

    /// Find the regions containing a point.
    ///
    /// Results are ordered by geodesic area, so the most specific region
    /// (e.g. a ZIP code) comes before its county and state.
    #[tool(description = "Find regions containing a point, smallest area first.")]
    async fn geo_containing(&self, params: Parameters<ContainingRequest>) -> Result<CallToolResult, McpError> {
        containing_impl(&self.engine, params.0).await
    }

    #[tool(description = "List locations ordered by name, optionally filtered by type. Pages with limit and offset.")]
    async fn list_locations(&self, params: Parameters<LocationsRequest>) -> Result<CallToolResult, McpError> {
        list_locations_impl(&self.engine, params.0).await
    }

    #[tool(description = "Fetch one location by ID, including its geometry.")]
    async fn get_location(&self, params: Parameters<LocationRequest>) -> Result<CallToolResult, McpError> {
        get_location_impl(&self.engine, params.0).await
    }

    #[tool(description = "Raw demographic observations for a location, optionally narrowed to a category and year.")]
    async fn demographics(&self, params: Parameters<DemographicsRequest>) -> Result<CallToolResult, McpError> {
        demographics_impl(&self.engine, params.0).await
    }

    #[tool(description = "List the demographic categories present in the store.")]
    async fn demographic_categories(&self) -> Result<CallToolResult, McpError> {
        demographic_categories_impl(&self.engine).await
    }

    #[tool(description = "List the observation years present in the store, oldest first.")]
    async fn years(&self) -> Result<CallToolResult, McpError> {
        years_impl(&self.engine).await
    }

    #[tool(
        description = "Latest value of each headline indicator (population, median household income, persons per household, median home value, poverty rate) for a location."
    )]
    async fn latest_indicators(&self, params: Parameters<LatestIndicatorsRequest>) -> Result<CallToolResult, McpError> {
        latest_indicators_impl(&self.engine, params.0).await
    }

    #[tool(description = "Every year's value of one demographic category for a location.")]
    async fn time_series(&self, params: Parameters<TimeSeriesRequest>) -> Result<CallToolResult, McpError> {
        time_series_impl(&self.engine, params.0).await
    }

    #[tool(
        description = "Compare one demographic category across locations, at a given year or each location's latest."
    )]
    async fn compare_locations(&self, params: Parameters<CompareRequest>) -> Result<CallToolResult, McpError> {
        compare_impl(&self.engine, params.0).await
    }

    #[tool(description = "List the location types present in the store.")]
    async fn location_types(&self) -> Result<CallToolResult, McpError> {
        location_types_impl(&self.engine).await
    }

    #[tool(description = "Bounding box of stored locations, optionally filtered by type.")]
    async fn bounding_box(&self, params: Parameters<BoundingBoxRequest>) -> Result<CallToolResult, McpError> {
        bounding_box_impl(&self.engine, params.0).await
    }

    #[tool(description = "Report whether the spatial store and the cache are reachable.")]
    async fn health(&self) -> Result<CallToolResult, McpError> {
        health_impl(&self.engine).await
    }

    /// Invalidate cached results.
    ///
    /// Takes operation names, location IDs, or `all`. Only the cache is
    /// affected.
    #[tool(description = "Invalidate cached query results by operation, by location, or all.")]
    async fn cache_invalidate(&self, params: Parameters<CacheInvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.engine, params.0).await
    }

    #[tool(description = "Remove expired cache entries.")]
    async fn cache_purge(&self) -> Result<CallToolResult, McpError> {
        purge_impl(&self.engine).await
    }
}

impl ServerHandler for GeocensusServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "geocensus".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Geospatial lookups over US census locations with cached demographic reads. Coordinates are WGS84 longitude/latitude."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
