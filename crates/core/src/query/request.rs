//! Query parameters as the query surface receives them.
//!
//! These are deserialized but not yet validated; the engine validates each
//! request before deriving a cache key.

use schemars::JsonSchema;
use serde::Deserialize;

/// Radius search around a point.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NearbyRequest {
    /// Longitude of the center in degrees (-180 to 180)
    pub longitude: f64,
    /// Latitude of the center in degrees (-90 to 90)
    pub latitude: f64,
    /// Search radius in meters (default: 10000)
    #[serde(default)]
    pub max_distance_meters: Option<f64>,
    /// Location categories to include: city, county, state, town, zip (default: all)
    #[serde(default)]
    pub types: Option<Vec<String>>,
    /// Maximum number of results (1-100)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Locations intersecting a polygon.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WithinRequest {
    /// Polygon ring as `[longitude, latitude]` pairs; closed automatically
    pub polygon: Vec<[f64; 2]>,
    /// Location categories to include (default: all)
    #[serde(default)]
    pub types: Option<Vec<String>>,
    /// Maximum number of results (1-1000)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Regions containing a point.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ContainingRequest {
    pub longitude: f64,
    pub latitude: f64,
    /// Location categories to include (default: all)
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LatestIndicatorsRequest {
    pub location_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TimeSeriesRequest {
    pub location_id: String,
    /// Normalized category name, e.g. `population`
    pub category: String,
}

/// One category across several locations.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CompareRequest {
    pub category: String,
    pub location_ids: Vec<String>,
    /// Exact year label to compare; each location's latest year when absent
    #[serde(default)]
    pub year: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct BoundingBoxRequest {
    /// Location categories to include (default: all)
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LocationRequest {
    pub location_id: String,
}

/// Raw observations of one location, optionally narrowed.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DemographicsRequest {
    pub location_id: String,
    /// Category name; raw labels are normalized (default: all)
    #[serde(default)]
    pub category: Option<String>,
    /// Exact year label (default: all)
    #[serde(default)]
    pub year: Option<String>,
}

/// A page of locations ordered by name.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct LocationsRequest {
    /// Location categories to include (default: all)
    #[serde(default)]
    pub types: Option<Vec<String>>,
    /// Page size (1-1000, default: 100)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Rows to skip (default: 0)
    #[serde(default)]
    pub offset: Option<usize>,
}
