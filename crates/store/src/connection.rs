//! Location store connection and row decoding.

use crate::error::StoreError;
use geocensus_core::geometry::Geometry;
use geocensus_core::model::{DemographicObservation, Location, LocationKind};
use geocensus_core::sqlite::{self, Migration};
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, Row};

const MIGRATIONS: &[Migration] = &[
    (1, include_str!("../migrations/001_locations.sql")),
    (2, include_str!("../migrations/002_demographics.sql")),
];

/// Column list matching [`LocationRow::read`].
pub(crate) const LOCATION_COLUMNS: &str = "location_id, name, type, fips_code, parent_id, geometry_json, scraped_at";

/// Column list matching [`read_observation`].
pub(crate) const OBSERVATION_COLUMNS: &str = "id, location_id, category, raw_category, year, value";

/// SQLite-backed location and demographics store.
///
/// Clones share the same background connection.
#[derive(Clone, Debug)]
pub struct LocationStore {
    pub(crate) conn: Connection,
}

impl LocationStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = sqlite::open(path, MIGRATIONS).await?;
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = sqlite::open_in_memory(MIGRATIONS).await?;
        Ok(Self { conn })
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.conn
            .clone()
            .close()
            .await
            .map_err(StoreError::Database)
    }
}

/// A `locations` row before geometry and category are decoded.
pub(crate) struct LocationRow {
    location_id: String,
    name: String,
    kind: String,
    fips_code: Option<String>,
    parent_id: Option<String>,
    geometry_json: Option<String>,
    scraped_at: Option<String>,
}

impl LocationRow {
    pub(crate) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            location_id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            fips_code: row.get(3)?,
            parent_id: row.get(4)?,
            geometry_json: row.get(5)?,
            scraped_at: row.get(6)?,
        })
    }
}

impl TryFrom<LocationRow> for Location {
    type Error = StoreError;

    fn try_from(row: LocationRow) -> Result<Self, StoreError> {
        let kind: LocationKind = row
            .kind
            .parse()
            .map_err(|_| StoreError::CorruptKind { location_id: row.location_id.clone(), kind: row.kind.clone() })?;
        let geometry = match row.geometry_json.as_deref() {
            Some(json) => Some(serde_json::from_str::<Geometry>(json).map_err(|e| StoreError::CorruptGeometry {
                location_id: row.location_id.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        Ok(Location {
            location_id: row.location_id,
            name: row.name,
            kind,
            fips_code: row.fips_code,
            parent_id: row.parent_id,
            geometry,
            scraped_at: row.scraped_at,
        })
    }
}

pub(crate) fn read_observation(row: &Row<'_>) -> rusqlite::Result<DemographicObservation> {
    Ok(DemographicObservation {
        id: row.get(0)?,
        location_id: row.get(1)?,
        category: row.get(2)?,
        raw_category: row.get(3)?,
        year: row.get(4)?,
        value: row.get(5)?,
    })
}
