//! Batch loading of scraped locations and observations.
//!
//! A batch is written in one transaction. Locations are upserted by ID;
//! observations are appended, since (location, category, year) is not
//! unique. Every successful write returns the [`DataLoadEvent`] the query
//! engine needs to invalidate what the write made stale.

use crate::connection::LocationStore;
use crate::error::StoreError;
use geocensus_core::model::{Location, LocationKind, normalize_category};
use geocensus_core::query::DataLoadEvent;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A scraped observation before its category is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObservation {
    pub location_id: String,
    /// Label as scraped, e.g. `"Median Household Income ($)"`.
    pub raw_category: String,
    pub year: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadBatch {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub observations: Vec<NewObservation>,
}

impl LoadBatch {
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.observations.is_empty()
    }
}

/// Stable ID for a scraped location.
///
/// Uses the FIPS code when there is one, otherwise the lower-cased name
/// with spaces replaced by underscores.
pub fn derive_location_id(kind: LocationKind, name: &str, fips_code: Option<&str>) -> String {
    match fips_code.map(str::trim).filter(|f| !f.is_empty()) {
        Some(fips) => format!("{kind}_fips_{fips}"),
        None => format!("{kind}_{}", name.trim().to_lowercase().replace(' ', "_")),
    }
}

struct LocationRecord {
    location_id: String,
    name: String,
    kind: &'static str,
    fips_code: Option<String>,
    parent_id: Option<String>,
    geometry_json: Option<String>,
    bbox: Option<[f64; 4]>,
    scraped_at: Option<String>,
}

struct ObservationRecord {
    location_id: String,
    category: String,
    raw_category: String,
    year: String,
    value: Option<f64>,
}

impl LocationStore {
    /// Write a batch and report which locations it touched.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRecord` before writing anything if a record
    /// is malformed, and `StoreError::Database` (with the transaction rolled
    /// back) if an observation names a location that doesn't exist.
    pub async fn load(&self, batch: LoadBatch) -> Result<DataLoadEvent, StoreError> {
        let mut event = DataLoadEvent::default();
        if batch.is_empty() {
            return Ok(event);
        }

        let locations = batch
            .locations
            .into_iter()
            .map(location_record)
            .collect::<Result<Vec<_>, _>>()?;
        let observations = batch
            .observations
            .into_iter()
            .map(observation_record)
            .collect::<Result<Vec<_>, _>>()?;

        event.locations_changed = locations.iter().map(|l| l.location_id.clone()).collect();
        event.observations_changed = observations.iter().map(|o| o.location_id.clone()).collect();
        let (location_count, observation_count) = (locations.len(), observations.len());

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut upsert = tx.prepare(
                        "INSERT INTO locations (location_id, name, type, fips_code, parent_id, geometry_json,
                             min_longitude, min_latitude, max_longitude, max_latitude, scraped_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                         ON CONFLICT(location_id) DO UPDATE SET
                             name = excluded.name,
                             type = excluded.type,
                             fips_code = excluded.fips_code,
                             parent_id = excluded.parent_id,
                             geometry_json = excluded.geometry_json,
                             min_longitude = excluded.min_longitude,
                             min_latitude = excluded.min_latitude,
                             max_longitude = excluded.max_longitude,
                             max_latitude = excluded.max_latitude,
                             scraped_at = excluded.scraped_at",
                    )?;
                    for l in &locations {
                        let [min_lon, min_lat, max_lon, max_lat] = l.bbox.map_or([None; 4], |b| b.map(Some));
                        upsert.execute(params![
                            l.location_id,
                            l.name,
                            l.kind,
                            l.fips_code,
                            l.parent_id,
                            l.geometry_json,
                            min_lon,
                            min_lat,
                            max_lon,
                            max_lat,
                            l.scraped_at,
                        ])?;
                    }

                    let mut insert = tx.prepare(
                        "INSERT INTO demographics (location_id, category, raw_category, year, value)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for o in &observations {
                        insert.execute(params![o.location_id, o.category, o.raw_category, o.year, o.value])?;
                    }
                }
                tx.commit()
            })
            .await?;

        tracing::info!(locations = location_count, observations = observation_count, "loaded batch");
        Ok(event)
    }

    /// Delete a location and, by cascade, its observations.
    ///
    /// Returns an empty event if the location didn't exist.
    pub async fn delete_location(&self, location_id: &str) -> Result<DataLoadEvent, StoreError> {
        let id = location_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| conn.execute("DELETE FROM locations WHERE location_id = ?1", params![id]))
            .await?;

        let mut event = DataLoadEvent::default();
        if deleted > 0 {
            event.locations_changed.insert(location_id.to_string());
            event.observations_changed.insert(location_id.to_string());
            tracing::info!(location_id, "deleted location");
        }
        Ok(event)
    }
}

fn location_record(location: Location) -> Result<LocationRecord, StoreError> {
    if location.location_id.trim().is_empty() {
        return Err(StoreError::InvalidRecord("location_id must not be empty".into()));
    }
    if location.name.trim().is_empty() {
        return Err(StoreError::InvalidRecord(format!("location {} has no name", location.location_id)));
    }
    if let Some(scraped_at) = &location.scraped_at {
        chrono::DateTime::parse_from_rfc3339(scraped_at).map_err(|e| {
            StoreError::InvalidRecord(format!("location {} has a bad scraped_at {scraped_at:?}: {e}", location.location_id))
        })?;
    }

    let (geometry_json, bbox) = match &location.geometry {
        Some(geometry) => {
            let json = serde_json::to_string(geometry)
                .map_err(|e| StoreError::InvalidRecord(format!("location {}: {e}", location.location_id)))?;
            let b = geometry.bbox();
            (Some(json), Some([b.min_longitude, b.min_latitude, b.max_longitude, b.max_latitude]))
        }
        None => (None, None),
    };

    Ok(LocationRecord {
        location_id: location.location_id,
        name: location.name,
        kind: location.kind.as_str(),
        fips_code: location.fips_code,
        parent_id: location.parent_id,
        geometry_json,
        bbox,
        scraped_at: location.scraped_at,
    })
}

fn observation_record(obs: NewObservation) -> Result<ObservationRecord, StoreError> {
    if obs.location_id.trim().is_empty() {
        return Err(StoreError::InvalidRecord("observation has no location_id".into()));
    }
    if obs.year.trim().is_empty() {
        return Err(StoreError::InvalidRecord(format!("observation for {} has no year", obs.location_id)));
    }
    if obs.value.is_some_and(|v| !v.is_finite()) {
        return Err(StoreError::InvalidRecord(format!("observation for {} has a non-finite value", obs.location_id)));
    }
    let category = normalize_category(&obs.raw_category);
    if category.is_empty() {
        return Err(StoreError::InvalidRecord(format!(
            "observation for {} has an empty category {:?}",
            obs.location_id, obs.raw_category
        )));
    }

    Ok(ObservationRecord {
        location_id: obs.location_id,
        category,
        raw_category: obs.raw_category,
        year: obs.year.trim().to_string(),
        value: obs.value,
    })
}
