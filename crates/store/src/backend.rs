//! [`SpatialBackend`] over the SQLite location store.
//!
//! Every spatial query first selects candidate rows whose stored bounding box
//! overlaps a search window, then refines them with the exact predicates in
//! [`crate::predicates`].

use crate::connection::{LOCATION_COLUMNS, LocationRow, LocationStore, OBSERVATION_COLUMNS, read_observation};
use crate::error::StoreError;
use crate::predicates;
use async_trait::async_trait;
use geocensus_core::Error;
use geocensus_core::gateway::SpatialBackend;
use geocensus_core::geometry::{BBox, Point, Polygon};
use geocensus_core::model::{
    DemographicObservation, Location, LocationKind, LocationWithArea, LocationWithDistance, TypeFilter,
};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::params_from_iter;

impl LocationStore {
    /// Locations with geometry whose bounding box overlaps `window`.
    async fn candidates(&self, window: BBox) -> Result<Vec<Location>, StoreError> {
        let sql = format!(
            "SELECT {LOCATION_COLUMNS} FROM locations
             WHERE geometry_json IS NOT NULL
               AND max_longitude >= ?1 AND min_longitude <= ?3
               AND max_latitude >= ?2 AND min_latitude <= ?4
             ORDER BY location_id"
        );
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![window.min_longitude, window.min_latitude, window.max_longitude, window.max_latitude],
                    LocationRow::read,
                )?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;

        rows.into_iter().map(Location::try_from).collect()
    }

    /// Look up a single location.
    pub async fn get_location(&self, location_id: &str) -> Result<Option<Location>, StoreError> {
        let location_id = location_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE location_id = ?1"))?;
                match stmt.query_row(params![location_id], LocationRow::read) {
                    Ok(row) => Ok(Some(row)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?;

        row.map(Location::try_from).transpose()
    }

    /// Every observation of a location in insertion order.
    pub async fn get_observations(&self, location_id: &str) -> Result<Vec<DemographicObservation>, StoreError> {
        let location_id = location_id.to_string();
        let observations = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM demographics WHERE location_id = ?1 ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![location_id], read_observation)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;
        Ok(observations)
    }

    /// A page of locations ordered by name then ID.
    pub async fn list_locations(
        &self, types: &TypeFilter, limit: usize, offset: usize,
    ) -> Result<Vec<Location>, StoreError> {
        let kinds: Vec<&'static str> = match types {
            TypeFilter::All => Vec::new(),
            TypeFilter::Only(kinds) => kinds.iter().map(LocationKind::as_str).collect(),
        };
        let filter = if kinds.is_empty() {
            String::new()
        } else {
            format!("WHERE type IN ({})", vec!["?"; kinds.len()].join(", "))
        };
        let sql = format!(
            "SELECT {LOCATION_COLUMNS} FROM locations {filter}
             ORDER BY name, location_id LIMIT {limit} OFFSET {offset}"
        );
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(kinds), LocationRow::read)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;

        rows.into_iter().map(Location::try_from).collect()
    }

    async fn distinct_categories(&self) -> Result<Vec<String>, StoreError> {
        let categories = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT category FROM demographics ORDER BY category")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await?;
        Ok(categories)
    }

    async fn distinct_years(&self) -> Result<Vec<String>, StoreError> {
        let years = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT year FROM demographics")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await?;
        Ok(years)
    }

    async fn distinct_kinds(&self) -> Result<Vec<LocationKind>, StoreError> {
        let kinds: Vec<String> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT DISTINCT type FROM locations ORDER BY type")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await?;

        kinds
            .into_iter()
            .map(|kind| {
                kind.parse()
                    .map_err(|_| StoreError::CorruptKind { location_id: String::new(), kind })
            })
            .collect()
    }

    async fn extent(&self, types: &TypeFilter) -> Result<Option<BBox>, StoreError> {
        let rows: Vec<(String, BBox)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT type, min_longitude, min_latitude, max_longitude, max_latitude FROM locations
                     WHERE geometry_json IS NOT NULL",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        BBox {
                            min_longitude: row.get(1)?,
                            min_latitude: row.get(2)?,
                            max_longitude: row.get(3)?,
                            max_latitude: row.get(4)?,
                        },
                    ))
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;

        let mut extent: Option<BBox> = None;
        for (kind, bbox) in rows {
            let kind: LocationKind =
                kind.parse().map_err(|_| StoreError::CorruptKind { location_id: String::new(), kind })?;
            if types.matches(kind) {
                extent = Some(extent.map_or(bbox, |acc| acc.union(&bbox)));
            }
        }
        Ok(extent)
    }
}

#[async_trait]
impl SpatialBackend for LocationStore {
    async fn nearby(
        &self, center: &Point, max_distance_meters: f64, types: &TypeFilter, limit: usize,
    ) -> Result<Vec<LocationWithDistance>, Error> {
        let window = predicates::search_window(center, max_distance_meters);
        let candidates = self.candidates(window).await?;

        let mut rows: Vec<LocationWithDistance> = candidates
            .into_iter()
            .filter(|l| types.matches(l.kind))
            .filter_map(|location| {
                let distance = predicates::distance_to(center, location.geometry.as_ref()?);
                (distance <= max_distance_meters).then_some(LocationWithDistance { location, distance_meters: distance })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.location.location_id.cmp(&b.location.location_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn within(&self, polygon: &Polygon, types: &TypeFilter, limit: usize) -> Result<Vec<Location>, Error> {
        let candidates = self.candidates(polygon.bbox()).await?;

        let mut rows: Vec<Location> = candidates
            .into_iter()
            .filter(|l| types.matches(l.kind))
            .filter(|l| l.geometry.as_ref().is_some_and(|g| predicates::intersects(polygon, g)))
            .collect();
        rows.truncate(limit);
        Ok(rows)
    }

    async fn containing(&self, point: &Point, types: &TypeFilter) -> Result<Vec<LocationWithArea>, Error> {
        let window = BBox::of_points(std::slice::from_ref(point));
        let candidates = self.candidates(window).await?;

        let mut rows: Vec<LocationWithArea> = candidates
            .into_iter()
            .filter(|l| types.matches(l.kind))
            .filter_map(|location| {
                let geometry = location.geometry.as_ref()?;
                if !predicates::contains(geometry, point) {
                    return None;
                }
                let area = predicates::geodesic_area(geometry);
                Some(LocationWithArea { location, area_square_meters: area })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.area_square_meters
                .total_cmp(&b.area_square_meters)
                .then_with(|| a.location.location_id.cmp(&b.location.location_id))
        });
        Ok(rows)
    }

    async fn location(&self, location_id: &str) -> Result<Option<Location>, Error> {
        Ok(self.get_location(location_id).await?)
    }

    async fn observations(&self, location_id: &str) -> Result<Vec<DemographicObservation>, Error> {
        Ok(self.get_observations(location_id).await?)
    }

    async fn locations(&self, types: &TypeFilter, limit: usize, offset: usize) -> Result<Vec<Location>, Error> {
        Ok(self.list_locations(types, limit, offset).await?)
    }

    async fn categories(&self) -> Result<Vec<String>, Error> {
        Ok(self.distinct_categories().await?)
    }

    async fn years(&self) -> Result<Vec<String>, Error> {
        Ok(self.distinct_years().await?)
    }

    async fn location_types(&self) -> Result<Vec<LocationKind>, Error> {
        Ok(self.distinct_kinds().await?)
    }

    async fn bounding_box(&self, types: &TypeFilter) -> Result<Option<BBox>, Error> {
        Ok(self.extent(types).await?)
    }

    async fn ping(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
