//! Exact spatial predicates over WGS84 geometry.
//!
//! Distances are great-circle (haversine) meters; areas are geodesic on the
//! WGS84 ellipsoid. Candidate rows are prefiltered by bounding box in SQL
//! and refined here.

use geo::{Contains, GeodesicArea, Intersects};
use geocensus_core::geometry::{BBox, Geometry, MultiPolygon, Point, Polygon};

/// Mean earth radius used for distances and search windows.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
pub fn haversine_distance(a: &Point, b: &Point) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let delta_lat = (b.latitude() - a.latitude()).to_radians();
    let delta_lng = (b.longitude() - a.longitude()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Minimum distance from `point` to `geometry` in meters; zero inside a
/// polygon.
pub fn distance_to(point: &Point, geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::Point(p) => haversine_distance(point, p),
        Geometry::Polygon(poly) => distance_to_polygon(point, poly),
        Geometry::MultiPolygon(mp) => mp
            .polygons()
            .iter()
            .map(|poly| distance_to_polygon(point, poly))
            .fold(f64::INFINITY, f64::min),
    }
}

fn distance_to_polygon(point: &Point, polygon: &Polygon) -> f64 {
    if to_geo_polygon(polygon).contains(&to_geo_point(point)) {
        return 0.0;
    }
    polygon
        .ring()
        .windows(2)
        .map(|edge| distance_to_segment(point, &edge[0], &edge[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Distance from a point to a segment, projecting in degree space and
/// measuring the closest point with haversine.
fn distance_to_segment(point: &Point, start: &Point, end: &Point) -> f64 {
    let dx = end.longitude() - start.longitude();
    let dy = end.latitude() - start.latitude();
    if dx == 0.0 && dy == 0.0 {
        return haversine_distance(point, start);
    }

    let t = ((point.longitude() - start.longitude()) * dx + (point.latitude() - start.latitude()) * dy)
        / (dx * dx + dy * dy);
    let t = t.clamp(0.0, 1.0);

    let lng = start.longitude() + t * dx;
    let lat = start.latitude() + t * dy;
    match Point::new(lng, lat) {
        Ok(closest) => haversine_distance(point, &closest),
        Err(_) => haversine_distance(point, start).min(haversine_distance(point, end)),
    }
}

/// Whether `geometry` intersects the query polygon (boundary included).
pub fn intersects(query: &Polygon, geometry: &Geometry) -> bool {
    let query = to_geo_polygon(query);
    match geometry {
        Geometry::Point(p) => query.intersects(&to_geo_point(p)),
        Geometry::Polygon(poly) => query.intersects(&to_geo_polygon(poly)),
        Geometry::MultiPolygon(mp) => query.intersects(&to_geo_multi_polygon(mp)),
    }
}

/// Whether `geometry` contains `point`.
///
/// A point geometry contains only itself; polygon boundaries do not count.
pub fn contains(geometry: &Geometry, point: &Point) -> bool {
    let target = to_geo_point(point);
    match geometry {
        Geometry::Point(p) => to_geo_point(p).contains(&target),
        Geometry::Polygon(poly) => to_geo_polygon(poly).contains(&target),
        Geometry::MultiPolygon(mp) => to_geo_multi_polygon(mp).contains(&target),
    }
}

/// Geodesic area in square meters; zero for points.
pub fn geodesic_area(geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::Point(_) => 0.0,
        Geometry::Polygon(poly) => to_geo_polygon(poly).geodesic_area_unsigned(),
        Geometry::MultiPolygon(mp) => to_geo_multi_polygon(mp).geodesic_area_unsigned(),
    }
}

/// Degree window enclosing every point within `radius_meters` of `center`.
///
/// Falls back to the full longitude range when the circle reaches a pole or
/// crosses the antimeridian.
pub fn search_window(center: &Point, radius_meters: f64) -> BBox {
    let angular = radius_meters / EARTH_RADIUS_METERS;
    let delta_lat = angular.to_degrees();
    let min_latitude = (center.latitude() - delta_lat).max(-90.0);
    let max_latitude = (center.latitude() + delta_lat).min(90.0);

    let full = BBox { min_longitude: -180.0, min_latitude, max_longitude: 180.0, max_latitude };
    if angular >= std::f64::consts::FRAC_PI_2 || min_latitude <= -90.0 || max_latitude >= 90.0 {
        return full;
    }

    let spread = angular.sin() / center.latitude().to_radians().cos();
    if spread >= 1.0 {
        return full;
    }
    let delta_lng = spread.asin().to_degrees();
    let min_longitude = center.longitude() - delta_lng;
    let max_longitude = center.longitude() + delta_lng;
    if min_longitude < -180.0 || max_longitude > 180.0 {
        return full;
    }
    BBox { min_longitude, min_latitude, max_longitude, max_latitude }
}

fn to_geo_point(point: &Point) -> geo_types::Point<f64> {
    geo_types::Point::new(point.longitude(), point.latitude())
}

fn to_geo_polygon(polygon: &Polygon) -> geo_types::Polygon<f64> {
    let exterior: Vec<geo_types::Coord<f64>> = polygon
        .ring()
        .iter()
        .map(|p| geo_types::Coord { x: p.longitude(), y: p.latitude() })
        .collect();
    geo_types::Polygon::new(geo_types::LineString::from(exterior), Vec::new())
}

fn to_geo_multi_polygon(multi: &MultiPolygon) -> geo_types::MultiPolygon<f64> {
    geo_types::MultiPolygon::new(multi.polygons().iter().map(to_geo_polygon).collect())
}
