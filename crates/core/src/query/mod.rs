//! Query orchestrator.
//!
//! [`QueryEngine`] composes the key codec, a [`CacheStore`] and a
//! [`PredicateGateway`]. Every read goes through the same path: validate,
//! derive the key, return a live cached result unchanged, otherwise compute
//! through the gateway under a per-key single flight and store the result at
//! the operation's tier.
//!
//! Cache failures never fail a request. A broken cache turns every lookup
//! into a miss and every store into a no-op, logged at `warn`.

mod flight;
pub mod request;

use crate::Error;
use crate::cache::key::{self, Operation};
use crate::cache::{CacheStore, CacheTier};
use crate::gateway::PredicateGateway;
use crate::geometry::{BBox, Point, Polygon};
use crate::indicators::{self, IndicatorSnapshot};
use crate::model::{
    Comparison, ComparisonEntry, DemographicObservation, Location, LocationKind, LocationWithArea,
    LocationWithDistance, TimeSeries, TypeFilter, normalize_category,
};
use flight::Flights;
use request::{
    BoundingBoxRequest, CompareRequest, ContainingRequest, DemographicsRequest, LatestIndicatorsRequest,
    LocationRequest, LocationsRequest, NearbyRequest, TimeSeriesRequest, WithinRequest,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

/// Largest accepted `nearby` limit.
pub const MAX_NEARBY_LIMIT: usize = 100;

/// Largest accepted `within` limit.
pub const MAX_WITHIN_LIMIT: usize = 1_000;

/// Page size used when a location listing gives none.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Largest accepted location listing page.
pub const MAX_LIST_LIMIT: usize = 1_000;

/// Search radius used when a `nearby` request gives none.
pub const DEFAULT_MAX_DISTANCE_METERS: f64 = 10_000.0;

/// Result limits applied when a request leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub nearby_default: usize,
    pub within_default: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self { nearby_default: 20, within_default: 100 }
    }
}

/// Notification that a data load changed stored locations or observations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DataLoadEvent {
    /// Locations inserted, updated or deleted.
    #[serde(default)]
    pub locations_changed: BTreeSet<String>,
    /// Locations whose observations were inserted or deleted.
    #[serde(default)]
    pub observations_changed: BTreeSet<String>,
}

impl DataLoadEvent {
    pub fn is_empty(&self) -> bool {
        self.locations_changed.is_empty() && self.observations_changed.is_empty()
    }

    /// Merge another event into this one.
    pub fn extend(&mut self, other: DataLoadEvent) {
        self.locations_changed.extend(other.locations_changed);
        self.observations_changed.extend(other.observations_changed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Store and cache both reachable.
    Healthy,
    /// Store reachable, cache bypassed.
    Degraded,
    /// Store unreachable.
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub cache_connected: bool,
    pub store_connected: bool,
    /// RFC 3339 timestamp of the check.
    pub checked_at: String,
}

/// The geospatial query engine.
///
/// Holds the cache and gateway for its whole lifecycle; call
/// [`QueryEngine::close`] to release the cache.
pub struct QueryEngine {
    cache: Arc<dyn CacheStore>,
    gateway: PredicateGateway,
    limits: QueryLimits,
    flights: Flights,
}

impl QueryEngine {
    pub fn new(cache: Arc<dyn CacheStore>, gateway: PredicateGateway) -> Self {
        Self { cache, gateway, limits: QueryLimits::default(), flights: Flights::default() }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Locations within a radius, nearest first.
    pub async fn nearby(&self, req: &NearbyRequest) -> Result<Vec<LocationWithDistance>, Error> {
        let center = Point::new(req.longitude, req.latitude)?;
        let max_distance = req.max_distance_meters.unwrap_or(DEFAULT_MAX_DISTANCE_METERS);
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "max_distance_meters must be a positive number, got {max_distance}"
            )));
        }
        let types = TypeFilter::parse(req.types.as_deref())?;
        let limit = resolve_limit("limit", req.limit, self.limits.nearby_default, MAX_NEARBY_LIMIT)?;

        let key = key::nearby_key(&center, max_distance, &types, limit);
        self.read_through(&key, Operation::Nearby.tier(), async {
            self.gateway.nearby(&center, max_distance, &types, limit).await
        })
        .await
    }

    /// Locations whose geometry intersects a polygon, by location ID.
    pub async fn within(&self, req: &WithinRequest) -> Result<Vec<Location>, Error> {
        let coords: Vec<(f64, f64)> = req.polygon.iter().map(|[lon, lat]| (*lon, *lat)).collect();
        let polygon = Polygon::from_coords(&coords)?;
        let types = TypeFilter::parse(req.types.as_deref())?;
        let limit = resolve_limit("limit", req.limit, self.limits.within_default, MAX_WITHIN_LIMIT)?;

        let key = key::within_key(&polygon, &types, limit);
        self.read_through(&key, Operation::Within.tier(), async {
            self.gateway.within(&polygon, &types, limit).await
        })
        .await
    }

    /// Regions containing a point, smallest first.
    pub async fn containing(&self, req: &ContainingRequest) -> Result<Vec<LocationWithArea>, Error> {
        let point = Point::new(req.longitude, req.latitude)?;
        let types = TypeFilter::parse(req.types.as_deref())?;

        let key = key::containing_key(&point, &types);
        self.read_through(&key, Operation::Containing.tier(), async {
            self.gateway.containing(&point, &types).await
        })
        .await
    }

    /// Latest value of each indicator, each resolved at its own maximum year.
    pub async fn latest_indicators(&self, req: &LatestIndicatorsRequest) -> Result<IndicatorSnapshot, Error> {
        let location_id = required("location_id", &req.location_id)?;

        let key = key::indicators_key(location_id);
        self.read_through(&key, Operation::Indicators.tier(), async {
            self.require_location(location_id).await?;
            let observations = self.gateway.observations(location_id).await?;
            Ok(IndicatorSnapshot::resolve(location_id, &observations))
        })
        .await
    }

    /// Every year of one category at one location.
    pub async fn time_series(&self, req: &TimeSeriesRequest) -> Result<TimeSeries, Error> {
        let location_id = required("location_id", &req.location_id)?;
        let category = normalize_category(required("category", &req.category)?);

        let key = key::time_series_key(location_id, &category);
        self.read_through(&key, Operation::TimeSeries.tier(), async {
            let location = self.require_location(location_id).await?;
            let observations = self.gateway.observations(location_id).await?;

            let mut values: BTreeMap<String, Option<f64>> = BTreeMap::new();
            for obs in observations.iter().filter(|o| o.category == category) {
                values
                    .entry(obs.year.clone())
                    .and_modify(|v| *v = larger(*v, obs.value))
                    .or_insert(obs.value);
            }
            if values.is_empty() {
                return Err(Error::NotFound(format!("no {category} data for location {location_id}")));
            }

            Ok(TimeSeries { location_id: location_id.to_string(), name: location.name, category: category.clone(), values })
        })
        .await
    }

    /// One category across several locations, at a fixed year or each
    /// location's latest.
    ///
    /// Unknown locations and locations without a matching value are left
    /// out of the result.
    pub async fn compare(&self, req: &CompareRequest) -> Result<Comparison, Error> {
        let category = normalize_category(required("category", &req.category)?);
        if req.location_ids.is_empty() {
            return Err(Error::InvalidArgument("location_ids must not be empty".into()));
        }
        let ids = req
            .location_ids
            .iter()
            .map(|id| required("location_ids", id).map(str::to_string))
            .collect::<Result<BTreeSet<String>, Error>>()?;
        let ids: Vec<String> = ids.into_iter().collect();
        let year = req.year.as_deref().map(str::trim).filter(|y| !y.is_empty());

        let key = key::compare_key(&category, &ids, year);
        self.read_through(&key, Operation::Compare.tier(), async {
            let mut comparison = Comparison::new();
            for id in &ids {
                let Some(location) = self.gateway.location(id).await? else {
                    tracing::debug!(location_id = %id, "skipping unknown location in comparison");
                    continue;
                };
                let observations = self.gateway.observations(id).await?;
                let candidates = observations.iter().filter(|o| o.category == category);
                if let Some(best) = indicators::latest(candidates, year) {
                    comparison.insert(
                        id.clone(),
                        ComparisonEntry {
                            name: location.name.clone(),
                            category: category.clone(),
                            year: best.year.clone(),
                            value: best.value,
                        },
                    );
                }
            }
            Ok(comparison)
        })
        .await
    }

    /// Distinct categories of stored locations.
    pub async fn location_types(&self) -> Result<Vec<LocationKind>, Error> {
        let key = key::location_types_key();
        self.read_through(&key, Operation::LocationTypes.tier(), self.gateway.location_types())
            .await
    }

    /// Extent of matching locations, or the continental US when none match.
    pub async fn bounding_box(&self, req: &BoundingBoxRequest) -> Result<BBox, Error> {
        let types = TypeFilter::parse(req.types.as_deref())?;

        let key = key::bounding_box_key(&types);
        self.read_through(&key, Operation::BoundingBox.tier(), async {
            Ok(self
                .gateway
                .bounding_box(&types)
                .await?
                .unwrap_or(BBox::CONTINENTAL_US))
        })
        .await
    }

    /// A single location.
    pub async fn location(&self, req: &LocationRequest) -> Result<Location, Error> {
        let location_id = required("location_id", &req.location_id)?;

        let key = key::location_key(location_id);
        self.read_through(&key, Operation::Location.tier(), self.require_location(location_id))
            .await
    }

    /// Raw observations of a location in load order, optionally narrowed to
    /// one category and one year.
    ///
    /// An unknown location is `NotFound`; filters matching nothing give an
    /// empty list.
    pub async fn demographics(&self, req: &DemographicsRequest) -> Result<Vec<DemographicObservation>, Error> {
        let location_id = required("location_id", &req.location_id)?;
        let category = req
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(normalize_category);
        let year = req.year.as_deref().map(str::trim).filter(|y| !y.is_empty());

        let key = key::demographics_key(location_id, category.as_deref(), year);
        self.read_through(&key, Operation::Demographics.tier(), async {
            self.require_location(location_id).await?;
            let mut observations = self.gateway.observations(location_id).await?;
            observations.retain(|o| {
                category.as_deref().is_none_or(|c| o.category == c) && year.is_none_or(|y| o.year == y)
            });
            Ok(observations)
        })
        .await
    }

    /// A page of locations ordered by name then ID.
    pub async fn locations(&self, req: &LocationsRequest) -> Result<Vec<Location>, Error> {
        let types = TypeFilter::parse(req.types.as_deref())?;
        let limit = resolve_limit("limit", req.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)?;
        let offset = req.offset.unwrap_or(0);

        let key = key::locations_key(&types, limit, offset);
        self.read_through(&key, Operation::Locations.tier(), self.gateway.locations(&types, limit, offset))
            .await
    }

    /// Distinct normalized demographic categories.
    pub async fn demographic_categories(&self) -> Result<Vec<String>, Error> {
        let key = key::categories_key();
        self.read_through(&key, Operation::Categories.tier(), self.gateway.categories())
            .await
    }

    /// Distinct observation years, oldest first.
    pub async fn years(&self) -> Result<Vec<String>, Error> {
        let key = key::years_key();
        self.read_through(&key, Operation::Years.tier(), self.gateway.years())
            .await
    }

    /// Invalidate the cache entries a data load made stale.
    ///
    /// Location changes invalidate every spatial result, the location
    /// listing and the location-derived reference data. Observation changes
    /// invalidate the category and year lists. Either kind invalidates every
    /// per-location read of the affected locations and all comparisons.
    /// Every prefix is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub async fn on_data_loaded(&self, event: &DataLoadEvent) -> Result<u64, Error> {
        if event.is_empty() {
            return Ok(0);
        }

        let mut prefixes = BTreeSet::new();
        if !event.locations_changed.is_empty() {
            for op in [
                Operation::Nearby,
                Operation::Within,
                Operation::Containing,
                Operation::LocationTypes,
                Operation::BoundingBox,
                Operation::Locations,
            ] {
                prefixes.insert(op.prefix());
            }
        }
        if !event.observations_changed.is_empty() {
            prefixes.insert(Operation::Categories.prefix());
            prefixes.insert(Operation::Years.prefix());
        }
        prefixes.extend(location_prefixes(event.locations_changed.iter().chain(&event.observations_changed)));

        let removed = self.invalidate_prefixes(prefixes).await?;
        tracing::info!(
            locations = event.locations_changed.len(),
            observations = event.observations_changed.len(),
            removed,
            "applied data load invalidation"
        );
        Ok(removed)
    }

    /// Invalidate every cached result of the given operations.
    pub async fn invalidate(&self, operations: &[Operation]) -> Result<u64, Error> {
        self.invalidate_prefixes(operations.iter().map(Operation::prefix).collect())
            .await
    }

    /// Invalidate every per-location read of the given locations, and all
    /// comparisons.
    pub async fn invalidate_locations(&self, location_ids: &[String]) -> Result<u64, Error> {
        if location_ids.is_empty() {
            return Ok(0);
        }
        let prefixes: BTreeSet<String> = location_prefixes(location_ids).collect();
        self.invalidate_prefixes(prefixes).await
    }

    /// Invalidate every entry this engine has written.
    pub async fn invalidate_all(&self) -> Result<u64, Error> {
        self.invalidate_prefixes(BTreeSet::from([key::namespace_prefix()]))
            .await
    }

    /// Physically remove expired cache entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let purged = self.cache.purge_expired().await?;
        tracing::info!(purged, "purged expired cache entries");
        Ok(purged)
    }

    /// Reachability of the cache and the spatial store.
    pub async fn health(&self) -> HealthReport {
        let (cache, store) = tokio::join!(self.cache.ping(), self.gateway.ping());
        if let Err(e) = &cache {
            tracing::warn!(error = %e, "cache health check failed");
        }
        if let Err(e) = &store {
            tracing::warn!(error = %e, "store health check failed");
        }

        let status = match (store.is_ok(), cache.is_ok()) {
            (true, true) => HealthStatus::Healthy,
            (true, false) => HealthStatus::Degraded,
            (false, _) => HealthStatus::Unhealthy,
        };
        HealthReport {
            status,
            cache_connected: cache.is_ok(),
            store_connected: store.is_ok(),
            checked_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// End the engine's lifecycle by closing the cache.
    pub async fn close(&self) -> Result<(), Error> {
        self.cache.close().await
    }

    async fn require_location(&self, location_id: &str) -> Result<Location, Error> {
        self.gateway
            .location(location_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("location {location_id}")))
    }

    /// Cached value for `key`, or the result of `compute` stored at `tier`.
    ///
    /// Concurrent misses on one key share a single computation: the first
    /// caller computes while holding the key's slot, later callers wait on the
    /// slot and decode what it left behind. If the computation fails, the
    /// next waiter computes in turn.
    async fn read_through<T, F>(&self, key: &str, tier: CacheTier, compute: F) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, Error>>,
    {
        if let Some(hit) = self.cached(key).await {
            return Ok(hit);
        }

        let flight = self.flights.join(key);
        let mut slot = flight.slot().lock().await;
        if let Some(raw) = slot.as_deref()
            && let Ok(value) = serde_json::from_str(raw)
        {
            tracing::debug!(key, "joined in-flight result");
            return Ok(value);
        }
        if let Some(hit) = self.cached(key).await {
            return Ok(hit);
        }

        tracing::debug!(key, "cache miss");
        let value = compute.await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(key, &raw, tier).await {
                    tracing::warn!(key, error = %e, "cache unavailable, result not stored");
                }
                *slot = Some(raw);
            }
            Err(e) => tracing::warn!(key, error = %e, "failed to serialize result for caching"),
        }
        Ok(value)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache unavailable, bypassing");
                None
            }
        }
    }

    async fn invalidate_prefixes(&self, prefixes: BTreeSet<String>) -> Result<u64, Error> {
        let mut removed = 0;
        let mut first_error = None;
        for prefix in prefixes {
            match self.cache.invalidate_by_prefix(&prefix).await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(prefix = %prefix, error = %e, "cache invalidation failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

/// Per-location prefixes of `ids`, followed by the comparison prefix.
fn location_prefixes<'a>(ids: impl IntoIterator<Item = &'a String>) -> impl Iterator<Item = String> {
    ids.into_iter()
        .flat_map(|id| Operation::PER_LOCATION.map(|op| op.location_prefix(id)))
        .chain(std::iter::once(Operation::Compare.prefix()))
}

/// Requested limit, or `default`; must lie in `1..=max`.
fn resolve_limit(field: &str, requested: Option<usize>, default: usize, max: usize) -> Result<usize, Error> {
    let limit = requested.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(Error::InvalidArgument(format!("{field} must be between 1 and {max}, got {limit}")));
    }
    Ok(limit)
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn larger(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDb;
    use crate::gateway::SpatialBackend;
    use crate::geometry::Geometry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory backend that counts calls per operation.
    #[derive(Default)]
    struct FakeBackend {
        locations: Vec<Location>,
        observations: Vec<DemographicObservation>,
        delay: Duration,
        calls: Mutex<HashMap<&'static str, usize>>,
    }

    impl FakeBackend {
        async fn record(&self, op: &'static str) {
            *self.calls.lock().unwrap().entry(op).or_default() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        fn calls(&self, op: &str) -> usize {
            self.calls.lock().unwrap().get(op).copied().unwrap_or_default()
        }
    }

    fn point_of(location: &Location) -> Option<Point> {
        match &location.geometry {
            Some(Geometry::Point(p)) => Some(*p),
            _ => None,
        }
    }

    fn area_of(kind: LocationKind) -> f64 {
        match kind {
            LocationKind::State => 4.0e11,
            LocationKind::County => 1.0e10,
            LocationKind::City => 1.0e8,
            LocationKind::Zip => 2.0e7,
            LocationKind::Town => 1.0e7,
        }
    }

    #[async_trait]
    impl SpatialBackend for FakeBackend {
        async fn nearby(
            &self, center: &Point, max_distance_meters: f64, types: &TypeFilter, _limit: usize,
        ) -> Result<Vec<LocationWithDistance>, Error> {
            self.record("nearby").await;
            Ok(self
                .locations
                .iter()
                .filter(|l| types.matches(l.kind))
                .filter_map(|l| {
                    let p = point_of(l)?;
                    let degrees = (p.longitude() - center.longitude()).hypot(p.latitude() - center.latitude());
                    Some(LocationWithDistance { location: l.clone(), distance_meters: degrees * 111_000.0 })
                })
                .filter(|r| r.distance_meters <= max_distance_meters)
                .collect())
        }

        async fn within(&self, polygon: &Polygon, types: &TypeFilter, _limit: usize) -> Result<Vec<Location>, Error> {
            self.record("within").await;
            let bbox = polygon.bbox();
            Ok(self
                .locations
                .iter()
                .filter(|l| types.matches(l.kind) && point_of(l).is_some_and(|p| bbox.contains_point(&p)))
                .cloned()
                .collect())
        }

        async fn containing(&self, _point: &Point, types: &TypeFilter) -> Result<Vec<LocationWithArea>, Error> {
            self.record("containing").await;
            Ok(self
                .locations
                .iter()
                .filter(|l| types.matches(l.kind))
                .map(|l| LocationWithArea { location: l.clone(), area_square_meters: area_of(l.kind) })
                .collect())
        }

        async fn location(&self, location_id: &str) -> Result<Option<Location>, Error> {
            self.record("location").await;
            Ok(self.locations.iter().find(|l| l.location_id == location_id).cloned())
        }

        async fn observations(&self, location_id: &str) -> Result<Vec<DemographicObservation>, Error> {
            self.record("observations").await;
            Ok(self
                .observations
                .iter()
                .filter(|o| o.location_id == location_id)
                .cloned()
                .collect())
        }

        async fn locations(&self, types: &TypeFilter, limit: usize, offset: usize) -> Result<Vec<Location>, Error> {
            self.record("locations").await;
            let mut rows: Vec<Location> = self.locations.iter().filter(|l| types.matches(l.kind)).cloned().collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(rows.into_iter().skip(offset).take(limit).collect())
        }

        async fn categories(&self) -> Result<Vec<String>, Error> {
            self.record("categories").await;
            Ok(self.observations.iter().map(|o| o.category.clone()).collect())
        }

        async fn years(&self) -> Result<Vec<String>, Error> {
            self.record("years").await;
            Ok(self.observations.iter().map(|o| o.year.clone()).collect())
        }

        async fn location_types(&self) -> Result<Vec<LocationKind>, Error> {
            self.record("location_types").await;
            Ok(self.locations.iter().map(|l| l.kind).collect())
        }

        async fn bounding_box(&self, types: &TypeFilter) -> Result<Option<BBox>, Error> {
            self.record("bounding_box").await;
            let points: Vec<Point> = self
                .locations
                .iter()
                .filter(|l| types.matches(l.kind))
                .filter_map(point_of)
                .collect();
            Ok((!points.is_empty()).then(|| BBox::of_points(&points)))
        }

        async fn ping(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Cache whose every operation fails.
    struct FailingCache;

    #[async_trait]
    impl CacheStore for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
            Err(Error::CacheUnavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _tier: CacheTier) -> Result<(), Error> {
            Err(Error::CacheUnavailable("connection refused".into()))
        }

        async fn invalidate_by_prefix(&self, _prefix: &str) -> Result<u64, Error> {
            Err(Error::CacheUnavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, Error> {
            Err(Error::CacheUnavailable("connection refused".into()))
        }

        async fn purge_expired(&self) -> Result<u64, Error> {
            Err(Error::CacheUnavailable("connection refused".into()))
        }

        async fn ping(&self) -> Result<(), Error> {
            Err(Error::CacheUnavailable("connection refused".into()))
        }

        async fn close(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    fn place(id: &str, name: &str, kind: LocationKind, lon: f64, lat: f64) -> Location {
        Location {
            location_id: id.into(),
            name: name.into(),
            kind,
            fips_code: None,
            parent_id: None,
            geometry: Some(Geometry::Point(Point::new(lon, lat).unwrap())),
            scraped_at: None,
        }
    }

    fn obs(id: i64, location_id: &str, category: &str, year: &str, value: Option<f64>) -> DemographicObservation {
        DemographicObservation {
            id,
            location_id: location_id.into(),
            category: category.into(),
            raw_category: category.into(),
            year: year.into(),
            value,
        }
    }

    fn fixture() -> FakeBackend {
        FakeBackend {
            locations: vec![
                place("US-CA", "California", LocationKind::State, -119.4, 36.7),
                place("US-KS", "Kansas", LocationKind::State, -98.4, 38.5),
                place("city-lebanon", "Lebanon", LocationKind::City, -98.55, 39.81),
                place("city-smith-center", "Smith Center", LocationKind::City, -98.78, 39.78),
                place("zip-66952", "66952", LocationKind::Zip, -98.56, 39.80),
                place("county-smith", "Smith County", LocationKind::County, -98.79, 39.78),
            ],
            observations: vec![
                obs(1, "US-CA", "population", "2020", Some(39_512_223.0)),
                obs(2, "US-CA", "population", "2021", Some(39_237_836.0)),
                obs(3, "US-CA", "median_household_income", "2017-2021", Some(84_097.0)),
                obs(4, "US-CA", "poverty_rate", "2021", None),
                obs(5, "US-KS", "population", "2021", Some(2_934_582.0)),
                obs(6, "US-KS", "population", "2019", Some(2_913_314.0)),
            ],
            ..Default::default()
        }
    }

    async fn engine(backend: Arc<FakeBackend>) -> QueryEngine {
        let cache = CacheDb::open_in_memory().await.unwrap();
        QueryEngine::new(Arc::new(cache), PredicateGateway::new(backend, Duration::from_secs(5)))
    }

    fn nearby_req() -> NearbyRequest {
        NearbyRequest {
            longitude: -98.5,
            latitude: 39.8,
            max_distance_meters: Some(50_000.0),
            types: Some(vec!["city".into()]),
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_nearby_cities_within_radius_ascending() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;

        let rows = engine.nearby(&nearby_req()).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location.location_id.as_str()).collect();
        assert_eq!(ids, vec!["city-lebanon", "city-smith-center"]);
        assert!(rows.iter().all(|r| r.location.kind == LocationKind::City && r.distance_meters <= 50_000.0));
        assert!(rows.windows(2).all(|w| w[0].distance_meters <= w[1].distance_meters));
    }

    #[tokio::test]
    async fn test_hit_returns_stored_result_without_gateway() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;

        let first = engine.nearby(&nearby_req()).await.unwrap();
        let second = engine.nearby(&nearby_req()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.calls("nearby"), 1);
    }

    #[tokio::test]
    async fn test_equivalent_requests_share_entry() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;

        let mut req = nearby_req();
        engine.nearby(&req).await.unwrap();
        req.types = Some(vec!["City".into(), "city".into()]);
        req.longitude = -98.500_000_1;
        req.limit = Some(20);
        engine.nearby(&req).await.unwrap();
        assert_eq!(backend.calls("nearby"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_gateway_call() {
        let backend = Arc::new(FakeBackend { delay: Duration::from_millis(50), ..fixture() });
        let engine = Arc::new(engine(backend.clone()).await);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.nearby(&nearby_req()).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(backend.calls("nearby"), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(engine.flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failing_cache_degrades_to_gateway() {
        let backend = Arc::new(fixture());
        let healthy = engine(backend.clone()).await;
        let degraded = QueryEngine::new(
            Arc::new(FailingCache),
            PredicateGateway::new(backend.clone(), Duration::from_secs(5)),
        );

        assert_eq!(degraded.nearby(&nearby_req()).await.unwrap(), healthy.nearby(&nearby_req()).await.unwrap());

        let within = WithinRequest {
            polygon: vec![[-100.0, 39.0], [-98.0, 39.0], [-98.0, 40.0], [-100.0, 40.0]],
            types: None,
            limit: None,
        };
        assert_eq!(degraded.within(&within).await.unwrap(), healthy.within(&within).await.unwrap());

        let containing = ContainingRequest { longitude: -98.5, latitude: 39.8, types: None };
        assert_eq!(
            degraded.containing(&containing).await.unwrap(),
            healthy.containing(&containing).await.unwrap()
        );

        let indicators = LatestIndicatorsRequest { location_id: "US-CA".into() };
        assert_eq!(
            degraded.latest_indicators(&indicators).await.unwrap(),
            healthy.latest_indicators(&indicators).await.unwrap()
        );

        degraded.nearby(&nearby_req()).await.unwrap();
        assert_eq!(backend.calls("nearby"), 3);
    }

    #[tokio::test]
    async fn test_latest_indicators_uses_max_year() {
        let engine = engine(Arc::new(fixture())).await;
        let snapshot = engine
            .latest_indicators(&LatestIndicatorsRequest { location_id: "US-CA".into() })
            .await
            .unwrap();

        let population = snapshot.population.unwrap();
        assert_eq!(population.value, 39_237_836.0);
        assert_eq!(population.year, "2021");
        assert_eq!(snapshot.median_household_income.unwrap().year, "2017-2021");
        assert!(snapshot.poverty_rate.is_none());
    }

    #[tokio::test]
    async fn test_latest_indicators_unknown_location() {
        let engine = engine(Arc::new(fixture())).await;
        let result = engine
            .latest_indicators(&LatestIndicatorsRequest { location_id: "US-XX".into() })
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let result = engine
            .latest_indicators(&LatestIndicatorsRequest { location_id: "  ".into() })
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let engine = engine(Arc::new(fixture())).await;

        let req = NearbyRequest { longitude: 200.0, ..nearby_req() };
        assert!(matches!(engine.nearby(&req).await, Err(Error::InvalidGeometry(_))));

        let req = NearbyRequest { max_distance_meters: Some(0.0), ..nearby_req() };
        assert!(matches!(engine.nearby(&req).await, Err(Error::InvalidArgument(_))));

        let req = NearbyRequest { limit: Some(101), ..nearby_req() };
        assert!(matches!(engine.nearby(&req).await, Err(Error::InvalidArgument(_))));

        let req = NearbyRequest { types: Some(vec!["village".into()]), ..nearby_req() };
        assert!(matches!(engine.nearby(&req).await, Err(Error::InvalidArgument(_))));

        let req = WithinRequest { polygon: vec![[0.0, 0.0], [1.0, 1.0]], types: None, limit: None };
        assert!(matches!(engine.within(&req).await, Err(Error::InvalidGeometry(_))));
    }

    #[tokio::test]
    async fn test_location_change_invalidates_spatial_results() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;

        engine.nearby(&nearby_req()).await.unwrap();
        engine.location_types().await.unwrap();

        let event = DataLoadEvent { locations_changed: BTreeSet::from(["city-lebanon".to_string()]), ..Default::default() };
        assert!(engine.on_data_loaded(&event).await.unwrap() >= 2);

        engine.nearby(&nearby_req()).await.unwrap();
        engine.location_types().await.unwrap();
        assert_eq!(backend.calls("nearby"), 2);
        assert_eq!(backend.calls("location_types"), 2);
    }

    #[tokio::test]
    async fn test_observation_change_scoped_to_location() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;
        let ca = LatestIndicatorsRequest { location_id: "US-CA".into() };
        let ks = LatestIndicatorsRequest { location_id: "US-KS".into() };

        engine.nearby(&nearby_req()).await.unwrap();
        engine.latest_indicators(&ca).await.unwrap();
        engine.latest_indicators(&ks).await.unwrap();
        assert_eq!(backend.calls("observations"), 2);

        let event =
            DataLoadEvent { observations_changed: BTreeSet::from(["US-CA".to_string()]), ..Default::default() };
        engine.on_data_loaded(&event).await.unwrap();

        engine.nearby(&nearby_req()).await.unwrap();
        engine.latest_indicators(&ca).await.unwrap();
        engine.latest_indicators(&ks).await.unwrap();
        assert_eq!(backend.calls("nearby"), 1);
        assert_eq!(backend.calls("observations"), 3);
    }

    #[tokio::test]
    async fn test_failing_cache_invalidation_reports_error() {
        let engine = QueryEngine::new(
            Arc::new(FailingCache),
            PredicateGateway::new(Arc::new(fixture()), Duration::from_secs(5)),
        );
        let event = DataLoadEvent { locations_changed: BTreeSet::from(["x".to_string()]), ..Default::default() };
        let err = engine.on_data_loaded(&event).await.unwrap_err();
        assert!(err.is_cache_failure());
        assert_eq!(engine.on_data_loaded(&DataLoadEvent::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_time_series_and_not_found() {
        let engine = engine(Arc::new(fixture())).await;
        let series = engine
            .time_series(&TimeSeriesRequest { location_id: "US-KS".into(), category: "Population".into() })
            .await
            .unwrap();
        assert_eq!(series.name, "Kansas");
        assert_eq!(series.category, "population");
        assert_eq!(series.values.keys().collect::<Vec<_>>(), vec!["2019", "2021"]);

        let missing = engine
            .time_series(&TimeSeriesRequest { location_id: "US-KS".into(), category: "poverty_rate".into() })
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_compare_latest_and_fixed_year() {
        let engine = engine(Arc::new(fixture())).await;
        let req = CompareRequest {
            category: "population".into(),
            location_ids: vec!["US-KS".into(), "US-CA".into(), "US-XX".into()],
            year: None,
        };
        let latest = engine.compare(&req).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["US-CA"].value, Some(39_237_836.0));
        assert_eq!(latest["US-KS"].year, "2021");

        let fixed = engine
            .compare(&CompareRequest { year: Some("2019".into()), ..req })
            .await
            .unwrap();
        assert_eq!(fixed.keys().collect::<Vec<_>>(), vec!["US-KS"]);
        assert_eq!(fixed["US-KS"].value, Some(2_913_314.0));
    }

    #[tokio::test]
    async fn test_bounding_box_falls_back_to_continental_us() {
        let engine = engine(Arc::new(fixture())).await;
        let bbox = engine
            .bounding_box(&BoundingBoxRequest { types: Some(vec!["town".into()]) })
            .await
            .unwrap();
        assert_eq!(bbox, BBox::CONTINENTAL_US);

        let states = engine
            .bounding_box(&BoundingBoxRequest { types: Some(vec!["state".into()]) })
            .await
            .unwrap();
        assert_eq!(states.min_longitude, -119.4);
        assert_eq!(states.max_latitude, 38.5);
    }

    #[tokio::test]
    async fn test_health_reports_degraded_cache() {
        let backend = Arc::new(fixture());
        let healthy = engine(backend.clone()).await.health().await;
        assert_eq!(healthy.status, HealthStatus::Healthy);

        let degraded = QueryEngine::new(Arc::new(FailingCache), PredicateGateway::new(backend, Duration::from_secs(5)))
            .health()
            .await;
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert!(!degraded.cache_connected);
        assert!(degraded.store_connected);
    }

    #[tokio::test]
    async fn test_location_detail_and_not_found() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;

        let req = LocationRequest { location_id: "US-KS".into() };
        assert_eq!(engine.location(&req).await.unwrap().name, "Kansas");
        engine.location(&req).await.unwrap();
        assert_eq!(backend.calls("location"), 1);

        let missing = engine.location(&LocationRequest { location_id: "US-XX".into() }).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        let blank = engine.location(&LocationRequest { location_id: "  ".into() }).await;
        assert!(matches!(blank, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_demographics_filters() {
        let engine = engine(Arc::new(fixture())).await;
        let all = DemographicsRequest { location_id: "US-CA".into(), category: None, year: None };

        let rows = engine.demographics(&all).await.unwrap();
        assert_eq!(rows.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let req = DemographicsRequest { category: Some("Population".into()), ..all.clone() };
        assert_eq!(engine.demographics(&req).await.unwrap().len(), 2);

        let req = DemographicsRequest { category: Some("population".into()), year: Some("2021".into()), ..all.clone() };
        let rows = engine.demographics(&req).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(39_237_836.0));

        let req = DemographicsRequest { year: Some("1990".into()), ..all.clone() };
        assert!(engine.demographics(&req).await.unwrap().is_empty());

        let req = DemographicsRequest { location_id: "US-XX".into(), ..all };
        assert!(matches!(engine.demographics(&req).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_locations_page_and_limits() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;

        let all = engine.locations(&LocationsRequest::default()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["66952", "California", "Kansas", "Lebanon", "Smith Center", "Smith County"]);

        let req = LocationsRequest { types: Some(vec!["city".into()]), limit: Some(1), offset: Some(1) };
        let page = engine.locations(&req).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].location_id, "city-smith-center");

        engine.locations(&LocationsRequest::default()).await.unwrap();
        assert_eq!(backend.calls("locations"), 2);

        let req = LocationsRequest { limit: Some(1_001), ..Default::default() };
        assert!(matches!(engine.locations(&req).await, Err(Error::InvalidArgument(_))));
        let req = LocationsRequest { limit: Some(0), ..Default::default() };
        assert!(matches!(engine.locations(&req).await, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_categories_and_years() {
        let engine = engine(Arc::new(fixture())).await;
        assert_eq!(
            engine.demographic_categories().await.unwrap(),
            vec!["median_household_income", "population", "poverty_rate"]
        );
        assert_eq!(engine.years().await.unwrap(), vec!["2019", "2020", "2017-2021", "2021"]);
    }

    #[tokio::test]
    async fn test_load_event_invalidates_listing_reads() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;
        let detail = LocationRequest { location_id: "US-KS".into() };
        let rows = DemographicsRequest { location_id: "US-KS".into(), category: None, year: None };

        engine.locations(&LocationsRequest::default()).await.unwrap();
        engine.location(&detail).await.unwrap();
        engine.demographics(&rows).await.unwrap();
        engine.years().await.unwrap();

        let event =
            DataLoadEvent { observations_changed: BTreeSet::from(["US-KS".to_string()]), ..Default::default() };
        engine.on_data_loaded(&event).await.unwrap();

        engine.locations(&LocationsRequest::default()).await.unwrap();
        engine.years().await.unwrap();
        engine.demographics(&rows).await.unwrap();
        assert_eq!(backend.calls("locations"), 1);
        assert_eq!(backend.calls("years"), 2);
        assert_eq!(backend.calls("observations"), 2);

        let event = DataLoadEvent { locations_changed: BTreeSet::from(["US-KS".to_string()]), ..Default::default() };
        engine.on_data_loaded(&event).await.unwrap();
        engine.locations(&LocationsRequest::default()).await.unwrap();
        assert_eq!(backend.calls("locations"), 2);
    }

    #[tokio::test]
    async fn test_invalidate_locations_scoped_to_ids() {
        let backend = Arc::new(fixture());
        let engine = engine(backend.clone()).await;
        let ca = LatestIndicatorsRequest { location_id: "US-CA".into() };
        let ks = LatestIndicatorsRequest { location_id: "US-KS".into() };

        engine.latest_indicators(&ca).await.unwrap();
        engine.latest_indicators(&ks).await.unwrap();
        assert_eq!(engine.invalidate_locations(&["US-CA".to_string()]).await.unwrap(), 1);
        assert_eq!(engine.invalidate_locations(&[]).await.unwrap(), 0);

        engine.latest_indicators(&ca).await.unwrap();
        engine.latest_indicators(&ks).await.unwrap();
        assert_eq!(backend.calls("observations"), 3);
    }
}
