//! Geometry helpers shared by every unit.
//!
//! Geodesic distance and bearing go through `geo`'s haversine
//! implementation. Containment, centroids and angle arithmetic are small
//! planar routines that work on any coordinate pair.

use geo::{HaversineBearing, HaversineDistance, Point};

use crate::types::{GeoPoint, PlanarPoint};

// ============================================================================
// GEODESIC
// ============================================================================

#[inline]
fn to_point(p: GeoPoint) -> Point<f64> {
    Point::new(p.lng, p.lat)
}

/// Great-circle distance in meters.
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    to_point(a).haversine_distance(&to_point(b))
}

/// Initial compass bearing from `a` to `b`, degrees in [0, 360).
pub fn initial_bearing(a: GeoPoint, b: GeoPoint) -> f64 {
    normalize_heading(to_point(a).haversine_bearing(to_point(b)))
}

// ============================================================================
// PLANAR
// ============================================================================

#[inline]
pub fn planar_distance(a: PlanarPoint, b: PlanarPoint) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Direction from `a` to `b` in the planar heading convention, degrees in
/// [0, 360).
///
/// Floor plans use image axes (x right, y down), so 0° points along +x and
/// headings increase clockwise on the plan, the same sense as a compass.
pub fn planar_bearing(a: PlanarPoint, b: PlanarPoint) -> f64 {
    normalize_heading((b.y - a.y).atan2(b.x - a.x).to_degrees())
}

/// Ray-casting containment test.
///
/// The polygon ring is implicitly closed. Results for points exactly on an
/// edge are unspecified. Fewer than three vertices contain nothing.
pub fn point_in_polygon(point: [f64; 2], vertices: &[[f64; 2]]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }

    let [px, py] = point;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = vertices[i];
        let [xj, yj] = vertices[j];

        // Offsets are taken relative to vertex i so the test only sees
        // differences between coordinates.
        if (yi > py) != (yj > py) {
            let crossing = (xj - xi) * (py - yi) / (yj - yi);
            if px - xi < crossing {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Containment of a geodetic point in a geodetic polygon, treating
/// (lng, lat) as planar coordinates.
pub fn geo_point_in_polygon(point: GeoPoint, polygon: &[GeoPoint]) -> bool {
    let ring: Vec<[f64; 2]> = polygon.iter().map(|p| [p.lng, p.lat]).collect();
    point_in_polygon([point.lng, point.lat], &ring)
}

pub fn planar_point_in_polygon(point: PlanarPoint, polygon: &[PlanarPoint]) -> bool {
    let ring: Vec<[f64; 2]> = polygon.iter().map(|p| [p.x, p.y]).collect();
    point_in_polygon([point.x, point.y], &ring)
}

/// Vertex mean of a polygon. `None` for an empty ring.
pub fn centroid(polygon: &[PlanarPoint]) -> Option<PlanarPoint> {
    if polygon.is_empty() {
        return None;
    }
    let n = polygon.len() as f64;
    let (sx, sy) = polygon
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(PlanarPoint::new(sx / n, sy / n))
}

// ============================================================================
// FEATURES & ANGLES
// ============================================================================

/// Cosine similarity of two feature vectors.
///
/// Returns 0 when lengths differ, either vector is empty, or either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    dot / denom
}

/// Wrap an angle difference into [-180, 180].
pub fn normalize_angle(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Wrap a heading into [0, 360).
pub fn normalize_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid may round up to the modulus for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
