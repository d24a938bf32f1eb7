//! Spatial predicate gateway.
//!
//! [`SpatialBackend`] is the contract the external spatial store implements.
//! [`PredicateGateway`] wraps a backend and owns the result semantics: every
//! call is bounded by a timeout, the type filter is re-applied, and results
//! are put into their documented total order regardless of what order the
//! backend produced them in.

use crate::Error;
use crate::geometry::{BBox, Point, Polygon};
use crate::indicators::YearKey;
use crate::model::{DemographicObservation, Location, LocationKind, LocationWithArea, LocationWithDistance, TypeFilter};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Spatial store operations over persisted WGS84 geometry.
///
/// Implementations report transport or storage failures as
/// `Error::UpstreamUnavailable`. Results limited by `limit` must already be
/// the first `limit` rows in the documented order.
#[async_trait]
pub trait SpatialBackend: Send + Sync {
    /// Locations within `max_distance_meters` of `center`, nearest first,
    /// ties by location ID.
    async fn nearby(
        &self, center: &Point, max_distance_meters: f64, types: &TypeFilter, limit: usize,
    ) -> Result<Vec<LocationWithDistance>, Error>;

    /// Locations whose geometry intersects `polygon`, by location ID.
    async fn within(&self, polygon: &Polygon, types: &TypeFilter, limit: usize) -> Result<Vec<Location>, Error>;

    /// Locations whose geometry contains `point`, smallest area first.
    async fn containing(&self, point: &Point, types: &TypeFilter) -> Result<Vec<LocationWithArea>, Error>;

    async fn location(&self, location_id: &str) -> Result<Option<Location>, Error>;

    /// All observations recorded for a location.
    async fn observations(&self, location_id: &str) -> Result<Vec<DemographicObservation>, Error>;

    /// Distinct categories of stored locations.
    async fn location_types(&self) -> Result<Vec<LocationKind>, Error>;

    /// Extent of every stored geometry matching `types`, None when nothing
    /// matches.
    async fn bounding_box(&self, types: &TypeFilter) -> Result<Option<BBox>, Error>;

    /// Page of locations matching `types`, ordered by name then ID.
    async fn locations(&self, types: &TypeFilter, limit: usize, offset: usize) -> Result<Vec<Location>, Error>;

    /// Distinct normalized demographic categories.
    async fn categories(&self) -> Result<Vec<String>, Error>;

    /// Distinct year labels of stored observations.
    async fn years(&self) -> Result<Vec<String>, Error>;

    async fn ping(&self) -> Result<(), Error>;
}

/// Timeout-bounded, order-enforcing wrapper around a [`SpatialBackend`].
#[derive(Clone)]
pub struct PredicateGateway {
    backend: Arc<dyn SpatialBackend>,
    timeout: Duration,
}

impl PredicateGateway {
    pub fn new(backend: Arc<dyn SpatialBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Locations within `max_distance_meters`, ascending by distance then ID.
    pub async fn nearby(
        &self, center: &Point, max_distance_meters: f64, types: &TypeFilter, limit: usize,
    ) -> Result<Vec<LocationWithDistance>, Error> {
        let mut rows = self
            .bounded("nearby", self.backend.nearby(center, max_distance_meters, types, limit))
            .await?;
        rows.retain(|r| types.matches(r.location.kind) && r.distance_meters <= max_distance_meters);
        rows.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.location.location_id.cmp(&b.location.location_id))
        });
        first_per_id(&mut rows, |r| &r.location.location_id);
        rows.truncate(limit);
        Ok(rows)
    }

    /// Locations intersecting `polygon`, ascending by ID.
    pub async fn within(&self, polygon: &Polygon, types: &TypeFilter, limit: usize) -> Result<Vec<Location>, Error> {
        let mut rows = self
            .bounded("within", self.backend.within(polygon, types, limit))
            .await?;
        rows.retain(|r| types.matches(r.kind));
        rows.sort_by(|a, b| a.location_id.cmp(&b.location_id));
        first_per_id(&mut rows, |r| &r.location_id);
        rows.truncate(limit);
        Ok(rows)
    }

    /// Locations containing `point`, ascending by area then ID.
    pub async fn containing(&self, point: &Point, types: &TypeFilter) -> Result<Vec<LocationWithArea>, Error> {
        let mut rows = self
            .bounded("containing", self.backend.containing(point, types))
            .await?;
        rows.retain(|r| types.matches(r.location.kind));
        rows.sort_by(|a, b| {
            a.area_square_meters
                .total_cmp(&b.area_square_meters)
                .then_with(|| a.location.location_id.cmp(&b.location.location_id))
        });
        first_per_id(&mut rows, |r| &r.location.location_id);
        Ok(rows)
    }

    pub async fn location(&self, location_id: &str) -> Result<Option<Location>, Error> {
        self.bounded("location", self.backend.location(location_id)).await
    }

    pub async fn observations(&self, location_id: &str) -> Result<Vec<DemographicObservation>, Error> {
        self.bounded("observations", self.backend.observations(location_id))
            .await
    }

    /// Distinct stored categories in lexicographic order.
    pub async fn location_types(&self) -> Result<Vec<LocationKind>, Error> {
        let mut kinds = self
            .bounded("location_types", self.backend.location_types())
            .await?;
        kinds.sort();
        kinds.dedup();
        Ok(kinds)
    }

    pub async fn bounding_box(&self, types: &TypeFilter) -> Result<Option<BBox>, Error> {
        self.bounded("bounding_box", self.backend.bounding_box(types))
            .await
    }

    /// Page of matching locations, ordered by name then ID.
    pub async fn locations(&self, types: &TypeFilter, limit: usize, offset: usize) -> Result<Vec<Location>, Error> {
        let mut rows = self
            .bounded("locations", self.backend.locations(types, limit, offset))
            .await?;
        rows.retain(|r| types.matches(r.kind));
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.location_id.cmp(&b.location_id)));
        first_per_id(&mut rows, |r| &r.location_id);
        rows.truncate(limit);
        Ok(rows)
    }

    /// Distinct categories in lexicographic order.
    pub async fn categories(&self) -> Result<Vec<String>, Error> {
        let mut categories = self.bounded("categories", self.backend.categories()).await?;
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    /// Distinct year labels, oldest first.
    pub async fn years(&self) -> Result<Vec<String>, Error> {
        let mut years = self.bounded("years", self.backend.years()).await?;
        years.sort_by(|a, b| YearKey::parse(a).cmp(&YearKey::parse(b)));
        years.dedup();
        Ok(years)
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.bounded("ping", self.backend.ping()).await
    }

    /// Run a backend call under the gateway timeout.
    ///
    /// Expiry and backend storage errors surface as `UpstreamUnavailable`.
    async fn bounded<T>(&self, op: &'static str, call: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_cache_failure() => Err(Error::UpstreamUnavailable(format!("{op}: {e}"))),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "spatial store call timed out");
                Err(Error::UpstreamUnavailable(format!(
                    "{op} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

/// Keep only the first row seen for each location ID.
fn first_per_id<T>(rows: &mut Vec<T>, id: impl Fn(&T) -> &String) {
    let mut seen = HashSet::new();
    rows.retain(|row| seen.insert(id(row).clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn loc(id: &str, kind: LocationKind) -> Location {
        Location {
            location_id: id.into(),
            name: id.into(),
            kind,
            fips_code: None,
            parent_id: None,
            geometry: Some(Geometry::Point(Point::new(0.0, 0.0).unwrap())),
            scraped_at: None,
        }
    }

    /// Returns canned rows in a deliberately scrambled order.
    struct ScrambledBackend {
        delay: Duration,
    }

    #[async_trait]
    impl SpatialBackend for ScrambledBackend {
        async fn nearby(
            &self, _center: &Point, _max: f64, _types: &TypeFilter, _limit: usize,
        ) -> Result<Vec<LocationWithDistance>, Error> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![
                LocationWithDistance { location: loc("c", LocationKind::City), distance_meters: 10.0 },
                LocationWithDistance { location: loc("b", LocationKind::City), distance_meters: 5.0 },
                LocationWithDistance { location: loc("a", LocationKind::City), distance_meters: 10.0 },
                LocationWithDistance { location: loc("z", LocationKind::Zip), distance_meters: 1.0 },
                LocationWithDistance { location: loc("far", LocationKind::City), distance_meters: 5_000.0 },
                LocationWithDistance { location: loc("b", LocationKind::City), distance_meters: 20.0 },
            ])
        }

        async fn within(&self, _polygon: &Polygon, _types: &TypeFilter, _limit: usize) -> Result<Vec<Location>, Error> {
            Ok(vec![loc("m", LocationKind::County), loc("b", LocationKind::City), loc("m", LocationKind::County)])
        }

        async fn containing(&self, _point: &Point, _types: &TypeFilter) -> Result<Vec<LocationWithArea>, Error> {
            Ok(vec![
                LocationWithArea { location: loc("state", LocationKind::State), area_square_meters: 4.0e11 },
                LocationWithArea { location: loc("zip", LocationKind::Zip), area_square_meters: 2.0e7 },
                LocationWithArea { location: loc("county", LocationKind::County), area_square_meters: 1.0e10 },
                LocationWithArea { location: loc("zip", LocationKind::Zip), area_square_meters: 5.0e10 },
            ])
        }

        async fn location(&self, _location_id: &str) -> Result<Option<Location>, Error> {
            Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed))
        }

        async fn observations(&self, _location_id: &str) -> Result<Vec<DemographicObservation>, Error> {
            Ok(Vec::new())
        }

        async fn location_types(&self) -> Result<Vec<LocationKind>, Error> {
            Ok(vec![LocationKind::Zip, LocationKind::City, LocationKind::Zip])
        }

        async fn bounding_box(&self, _types: &TypeFilter) -> Result<Option<BBox>, Error> {
            Ok(None)
        }

        async fn locations(&self, _types: &TypeFilter, _limit: usize, _offset: usize) -> Result<Vec<Location>, Error> {
            let named = |id: &str, name: &str, kind| Location { name: name.into(), ..loc(id, kind) };
            Ok(vec![
                named("zip_1", "Beta", LocationKind::Zip),
                named("city_2", "Alpha", LocationKind::City),
                named("city_1", "Alpha", LocationKind::City),
                named("zip_1", "Beta", LocationKind::Zip),
            ])
        }

        async fn categories(&self) -> Result<Vec<String>, Error> {
            Ok(vec!["population".into(), "median_home_value".into(), "population".into()])
        }

        async fn years(&self) -> Result<Vec<String>, Error> {
            Ok(vec!["2021".into(), "2017-2021".into(), "2019".into(), "2021".into()])
        }

        async fn ping(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    fn gateway(delay: Duration, timeout: Duration) -> PredicateGateway {
        PredicateGateway::new(Arc::new(ScrambledBackend { delay }), timeout)
    }

    #[tokio::test]
    async fn test_nearby_total_order_and_filtering() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let center = Point::new(0.0, 0.0).unwrap();
        let rows = gw
            .nearby(&center, 1_000.0, &TypeFilter::only([LocationKind::City]), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location.location_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        for pair in rows.windows(2) {
            assert!(pair[0].distance_meters <= pair[1].distance_meters);
            if pair[0].distance_meters == pair[1].distance_meters {
                assert!(pair[0].location.location_id < pair[1].location.location_id);
            }
        }
    }

    #[tokio::test]
    async fn test_nearby_drops_non_adjacent_duplicates() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let center = Point::new(0.0, 0.0).unwrap();
        let rows = gw.nearby(&center, 1_000.0, &TypeFilter::All, 10).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location.location_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "b", "a", "c"]);
        assert_eq!(rows[1].distance_meters, 5.0);
    }

    #[tokio::test]
    async fn test_nearby_limit_applies_after_ordering() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let center = Point::new(0.0, 0.0).unwrap();
        let rows = gw.nearby(&center, 1_000.0, &TypeFilter::All, 2).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location.location_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "b"]);
    }

    #[tokio::test]
    async fn test_within_sorted_and_deduplicated() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let poly = Polygon::from_coords(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]).unwrap();
        let rows = gw.within(&poly, &TypeFilter::All, 100).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "m"]);
    }

    #[tokio::test]
    async fn test_containing_smallest_first() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let rows = gw
            .containing(&Point::new(0.0, 0.0).unwrap(), &TypeFilter::All)
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location.location_id.as_str()).collect();
        assert_eq!(ids, vec!["zip", "county", "state"]);
        assert_eq!(rows[0].area_square_meters, 2.0e7);
        assert!(rows.windows(2).all(|w| w[0].area_square_meters <= w[1].area_square_meters));
    }

    #[tokio::test]
    async fn test_locations_ordered_by_name_then_id() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let rows = gw.locations(&TypeFilter::All, 10, 0).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.location_id.as_str()).collect();
        assert_eq!(ids, vec!["city_1", "city_2", "zip_1"]);

        let cities = gw
            .locations(&TypeFilter::only([LocationKind::City]), 1, 0)
            .await
            .unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].location_id, "city_1");
    }

    #[tokio::test]
    async fn test_reference_lists_sorted_unique() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(gw.categories().await.unwrap(), vec!["median_home_value", "population"]);
        assert_eq!(gw.years().await.unwrap(), vec!["2019", "2017-2021", "2021"]);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_upstream_unavailable() {
        let gw = gateway(Duration::from_millis(200), Duration::from_millis(20));
        let result = gw
            .nearby(&Point::new(0.0, 0.0).unwrap(), 10.0, &TypeFilter::All, 5)
            .await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_backend_storage_error_is_upstream() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        let result = gw.location("x").await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_location_types_sorted_unique() {
        let gw = gateway(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(gw.location_types().await.unwrap(), vec![LocationKind::City, LocationKind::Zip]);
    }
}
