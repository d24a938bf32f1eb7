//! Geometry value types: points, polygons and bounding boxes.
//!
//! All coordinates are WGS84 longitude/latitude in degrees. Constructors
//! validate ranges and polygon shape, and deserialization goes through the
//! same constructors, so a value of these types is always valid.

use crate::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Decimal places coordinates are compared and keyed at (about 0.1 m).
pub const COORDINATE_DECIMALS: u32 = 6;

/// Longitude/latitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "RawPoint")]
pub struct Point {
    longitude: f64,
    latitude: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
struct RawPoint {
    longitude: f64,
    latitude: f64,
}

impl TryFrom<RawPoint> for Point {
    type Error = Error;

    fn try_from(raw: RawPoint) -> Result<Self, Error> {
        Point::new(raw.longitude, raw.latitude)
    }
}

impl Point {
    /// Construct a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, Error> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidGeometry(format!("longitude {longitude} outside [-180, 180]")));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidGeometry(format!("latitude {latitude} outside [-90, 90]")));
        }
        Ok(Self { longitude, latitude })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Coordinates as fixed-point integers at [`COORDINATE_DECIMALS`] places.
    ///
    /// Two points with equal fixed forms are the same vertex; `-0.0` and
    /// `0.0` collapse together.
    pub fn fixed(&self) -> (i64, i64) {
        let scale = 10f64.powi(COORDINATE_DECIMALS as i32);
        ((self.longitude * scale).round() as i64, (self.latitude * scale).round() as i64)
    }
}

/// A closed polygon ring without holes.
///
/// The stored ring always ends with a copy of its first vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "RawPolygon")]
pub struct Polygon {
    ring: Vec<Point>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct RawPolygon {
    ring: Vec<Point>,
}

impl TryFrom<RawPolygon> for Polygon {
    type Error = Error;

    fn try_from(raw: RawPolygon) -> Result<Self, Error> {
        Polygon::new(raw.ring)
    }
}

impl Polygon {
    /// Construct a polygon from an ordered ring, closing it if needed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeometry` when the ring has fewer than 3 distinct
    /// vertices at [`COORDINATE_DECIMALS`] precision.
    pub fn new(mut ring: Vec<Point>) -> Result<Self, Error> {
        let mut distinct: Vec<(i64, i64)> = ring.iter().map(Point::fixed).collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }

        if ring.first() != ring.last()
            && let Some(first) = ring.first().copied()
        {
            ring.push(first);
        }

        Ok(Self { ring })
    }

    /// Construct a polygon from raw `(longitude, latitude)` pairs.
    pub fn from_coords(coords: &[(f64, f64)]) -> Result<Self, Error> {
        let ring = coords
            .iter()
            .map(|&(lon, lat)| Point::new(lon, lat))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ring)
    }

    /// The closed ring (last vertex equals the first).
    pub fn ring(&self) -> &[Point] {
        &self.ring
    }

    /// The ring without its closing vertex.
    pub fn open_ring(&self) -> &[Point] {
        &self.ring[..self.ring.len() - 1]
    }

    pub fn bbox(&self) -> BBox {
        BBox::of_points(&self.ring)
    }
}

/// Stored geometry of a location.
///
/// Query inputs are only ever points or polygons; multipolygons appear for
/// multi-part regions loaded by the data pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Geometry {
    Point(Point),
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
}

/// One or more polygons forming a single region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "RawMultiPolygon")]
pub struct MultiPolygon {
    polygons: Vec<Polygon>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct RawMultiPolygon {
    polygons: Vec<Polygon>,
}

impl TryFrom<RawMultiPolygon> for MultiPolygon {
    type Error = Error;

    fn try_from(raw: RawMultiPolygon) -> Result<Self, Error> {
        MultiPolygon::new(raw.polygons)
    }
}

impl MultiPolygon {
    pub fn new(polygons: Vec<Polygon>) -> Result<Self, Error> {
        if polygons.is_empty() {
            return Err(Error::InvalidGeometry("multipolygon has no parts".into()));
        }
        Ok(Self { polygons })
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }
}

impl Geometry {
    /// Bounding box of the geometry.
    pub fn bbox(&self) -> BBox {
        match self {
            Geometry::Point(p) => BBox::of_points(std::slice::from_ref(p)),
            Geometry::Polygon(poly) => poly.bbox(),
            Geometry::MultiPolygon(mp) => mp
                .polygons
                .iter()
                .map(Polygon::bbox)
                .reduce(|a, b| a.union(&b))
                .unwrap_or_else(|| BBox::of_points(&[])),
        }
    }
}

/// Axis-aligned longitude/latitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BBox {
    pub min_longitude: f64,
    pub min_latitude: f64,
    pub max_longitude: f64,
    pub max_latitude: f64,
}

impl BBox {
    /// Fallback extent (continental United States) used when no location
    /// matches a bounding-box request.
    pub const CONTINENTAL_US: BBox = BBox {
        min_longitude: -124.848974,
        min_latitude: 24.396308,
        max_longitude: -66.885444,
        max_latitude: 49.384358,
    };

    /// Smallest box containing all points. An empty slice yields an inverted
    /// (empty) box that intersects nothing.
    pub fn of_points(points: &[Point]) -> Self {
        points.iter().fold(
            BBox {
                min_longitude: f64::INFINITY,
                min_latitude: f64::INFINITY,
                max_longitude: f64::NEG_INFINITY,
                max_latitude: f64::NEG_INFINITY,
            },
            |acc, p| BBox {
                min_longitude: acc.min_longitude.min(p.longitude),
                min_latitude: acc.min_latitude.min(p.latitude),
                max_longitude: acc.max_longitude.max(p.longitude),
                max_latitude: acc.max_latitude.max(p.latitude),
            },
        )
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_longitude: self.min_longitude.min(other.min_longitude),
            min_latitude: self.min_latitude.min(other.min_latitude),
            max_longitude: self.max_longitude.max(other.max_longitude),
            max_latitude: self.max_latitude.max(other.max_latitude),
        }
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_longitude <= other.max_longitude
            && self.max_longitude >= other.min_longitude
            && self.min_latitude <= other.max_latitude
            && self.max_latitude >= other.min_latitude
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        (self.min_longitude..=self.max_longitude).contains(&point.longitude)
            && (self.min_latitude..=self.max_latitude).contains(&point.latitude)
    }
}
