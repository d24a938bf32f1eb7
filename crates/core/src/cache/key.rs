//! Deterministic cache key derivation.
//!
//! A key is `geo:<operation>:<digest>` where the digest is the SHA-256 of a
//! canonical parameter string. Canonicalization rounds coordinates to
//! micro-degrees, distances to millimetres, sorts type filters and rotates
//! polygon rings to a fixed start vertex and winding, so any two requests that
//! describe the same query produce the same key.
//!
//! Location-scoped operations put a digest of the location ID in its own key
//! segment so a single location's entries can be removed by prefix.

use super::tier::CacheTier;
use crate::geometry::{Point, Polygon};
use crate::model::TypeFilter;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Decimal places kept for distances in meters.
pub const DISTANCE_DECIMALS: u32 = 3;

const KEY_NAMESPACE: &str = "geo";

/// Cached operation, the first segment after the namespace in every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Nearby,
    Within,
    Containing,
    Indicators,
    TimeSeries,
    Compare,
    LocationTypes,
    BoundingBox,
    Location,
    Demographics,
    Locations,
    Categories,
    Years,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::Nearby,
        Operation::Within,
        Operation::Containing,
        Operation::Indicators,
        Operation::TimeSeries,
        Operation::Compare,
        Operation::LocationTypes,
        Operation::BoundingBox,
        Operation::Location,
        Operation::Demographics,
        Operation::Locations,
        Operation::Categories,
        Operation::Years,
    ];

    /// Operations whose keys are scoped to a single location.
    pub const PER_LOCATION: [Operation; 4] =
        [Operation::Indicators, Operation::TimeSeries, Operation::Location, Operation::Demographics];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Nearby => "nearby",
            Operation::Within => "within",
            Operation::Containing => "containing",
            Operation::Indicators => "indicators",
            Operation::TimeSeries => "timeseries",
            Operation::Compare => "compare",
            Operation::LocationTypes => "location_types",
            Operation::BoundingBox => "bounding_box",
            Operation::Location => "location",
            Operation::Demographics => "demographics",
            Operation::Locations => "locations",
            Operation::Categories => "categories",
            Operation::Years => "years",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// TTL tier results of this operation are stored under.
    pub fn tier(&self) -> CacheTier {
        match self {
            Operation::Nearby | Operation::Within | Operation::Containing => CacheTier::Short,
            Operation::Indicators
            | Operation::TimeSeries
            | Operation::Compare
            | Operation::Location
            | Operation::Demographics => CacheTier::Medium,
            Operation::LocationTypes
            | Operation::BoundingBox
            | Operation::Locations
            | Operation::Categories
            | Operation::Years => CacheTier::Long,
        }
    }

    /// Prefix shared by every key of this operation.
    pub fn prefix(&self) -> String {
        format!("{KEY_NAMESPACE}:{}:", self.name())
    }

    /// Prefix shared by every key of this operation for one location.
    pub fn location_prefix(&self, location_id: &str) -> String {
        format!("{}{}:", self.prefix(), digest(location_id))
    }
}

/// Prefix matching every key produced by this codec.
pub fn namespace_prefix() -> String {
    format!("{KEY_NAMESPACE}:")
}

pub fn nearby_key(center: &Point, max_distance_meters: f64, types: &TypeFilter, limit: usize) -> String {
    let mut canonical = String::new();
    push_point(&mut canonical, "center", center);
    push_field(&mut canonical, "distance_mm", scaled(max_distance_meters, DISTANCE_DECIMALS));
    push_field(&mut canonical, "types", types.canonical());
    push_field(&mut canonical, "limit", limit);
    key(Operation::Nearby, &canonical)
}

pub fn within_key(polygon: &Polygon, types: &TypeFilter, limit: usize) -> String {
    let ring = canonical_ring(polygon)
        .iter()
        .map(|(lon, lat)| format!("{lon} {lat}"))
        .collect::<Vec<_>>()
        .join(",");
    let mut canonical = String::new();
    push_field(&mut canonical, "ring", ring);
    push_field(&mut canonical, "types", types.canonical());
    push_field(&mut canonical, "limit", limit);
    key(Operation::Within, &canonical)
}

pub fn containing_key(point: &Point, types: &TypeFilter) -> String {
    let mut canonical = String::new();
    push_point(&mut canonical, "point", point);
    push_field(&mut canonical, "types", types.canonical());
    key(Operation::Containing, &canonical)
}

pub fn indicators_key(location_id: &str) -> String {
    format!("{}latest", Operation::Indicators.location_prefix(location_id))
}

pub fn time_series_key(location_id: &str, category: &str) -> String {
    format!("{}{}", Operation::TimeSeries.location_prefix(location_id), digest(category))
}

/// Key for a comparison; location order and duplicates do not matter.
pub fn compare_key(category: &str, location_ids: &[String], year: Option<&str>) -> String {
    let mut ids: Vec<&str> = location_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();
    let mut canonical = String::new();
    push_field(&mut canonical, "category", category);
    push_field(&mut canonical, "locations", ids.iter().map(|id| digest(id)).collect::<Vec<_>>().join(","));
    push_field(&mut canonical, "year", year.unwrap_or("latest"));
    key(Operation::Compare, &canonical)
}

pub fn location_types_key() -> String {
    key(Operation::LocationTypes, "")
}

pub fn bounding_box_key(types: &TypeFilter) -> String {
    let mut canonical = String::new();
    push_field(&mut canonical, "types", types.canonical());
    key(Operation::BoundingBox, &canonical)
}

pub fn location_key(location_id: &str) -> String {
    format!("{}detail", Operation::Location.location_prefix(location_id))
}

/// Key for a location's raw observations; `None` filters read as "all".
pub fn demographics_key(location_id: &str, category: Option<&str>, year: Option<&str>) -> String {
    let mut canonical = String::new();
    push_field(&mut canonical, "category", category.unwrap_or("all"));
    push_field(&mut canonical, "year", year.unwrap_or("all"));
    format!("{}{}", Operation::Demographics.location_prefix(location_id), digest(&canonical))
}

pub fn locations_key(types: &TypeFilter, limit: usize, offset: usize) -> String {
    let mut canonical = String::new();
    push_field(&mut canonical, "types", types.canonical());
    push_field(&mut canonical, "limit", limit);
    push_field(&mut canonical, "offset", offset);
    key(Operation::Locations, &canonical)
}

pub fn categories_key() -> String {
    key(Operation::Categories, "")
}

pub fn years_key() -> String {
    key(Operation::Years, "")
}

/// Canonical vertex sequence of a polygon in micro-degrees.
///
/// The closing vertex and consecutive duplicates are dropped, then the ring
/// is rotated and oriented to its lexicographically smallest form, so the
/// same ring given from any start vertex in either direction is identical.
pub fn canonical_ring(polygon: &Polygon) -> Vec<(i64, i64)> {
    let mut ring: Vec<(i64, i64)> = polygon.open_ring().iter().map(Point::fixed).collect();
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    let Some(min) = ring.iter().min().copied() else {
        return ring;
    };
    let reversed: Vec<(i64, i64)> = ring.iter().rev().copied().collect();

    let mut best: Option<Vec<(i64, i64)>> = None;
    for seq in [&ring, &reversed] {
        for (start, vertex) in seq.iter().enumerate() {
            if *vertex != min {
                continue;
            }
            let candidate: Vec<(i64, i64)> = seq[start..].iter().chain(&seq[..start]).copied().collect();
            if best.as_ref().is_none_or(|b| candidate < *b) {
                best = Some(candidate);
            }
        }
    }
    best.unwrap_or(ring)
}

/// Fixed-point integer form of `value` at `decimals` places.
///
/// Negative zero and values that round to zero collapse to `0`.
fn scaled(value: f64, decimals: u32) -> i64 {
    (value * 10f64.powi(decimals as i32)).round() as i64
}

fn push_point(out: &mut String, name: &str, point: &Point) {
    let (lon, lat) = point.fixed();
    push_field(out, name, format!("{lon} {lat}"));
}

fn push_field(out: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = write!(out, "{name}={value};");
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn key(op: Operation, canonical: &str) -> String {
    format!("{}{}", op.prefix(), digest(canonical))
}
