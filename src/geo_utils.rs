//! # Geographic Utilities
//!
//! Shared geometric primitives used by both consolidation pipelines.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`planar_distance`] | Euclidean distance between two points in degree space |
//! | [`is_proximate`] | "Same place" test under a degree tolerance |
//! | [`boxes_may_overlap`] | Cheap rejection of route pairs that cannot share a point |
//! | [`compute_bounds`] | Tightest bounding box of a point sequence |
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a route in meters |
//! | [`emission_intensity`] | Per-distance intensity from a mass and a distance |
//!
//! ## Example
//!
//! ```rust
//! use route_consolidator::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(48.2000, 16.3700);
//! let b = GpsPoint::new(48.2004, 16.3703);
//!
//! // 0.0005 degrees apart: the same place at the default route tolerance
//! assert!(geo_utils::is_proximate(&a, &b, 0.001));
//! assert!(geo_utils::is_proximate(&b, &a, 0.001));
//! ```
//!
//! ## Coordinate System
//!
//! Proximity is measured directly on (latitude, longitude) degrees, without
//! projection. One degree of longitude shrinks with `cos(latitude)`, so a
//! degree tolerance is only meaningful at the scale of a single region; a
//! tolerance of 0.001 degrees is roughly 110 m north-south and 75 m east-west
//! around 48°N. Lengths reported in meters use the haversine formula.

use crate::{Bounds, GpsPoint};
use geo::{Distance, Haversine, Point};

// =============================================================================
// Proximity
// =============================================================================

/// Planar Euclidean distance between two points, in degrees.
///
/// This is not a geodesic distance: latitude and longitude differences are
/// combined as if they were Cartesian coordinates.
#[inline]
pub fn planar_distance(p: &GpsPoint, q: &GpsPoint) -> f64 {
    let dlat = p.latitude - q.latitude;
    let dlng = p.longitude - q.longitude;
    (dlat * dlat + dlng * dlng).sqrt()
}

/// Check whether two coordinates denote the same physical location.
///
/// True iff the planar distance is strictly less than `tolerance` (degrees).
/// Symmetric in `p` and `q`.
///
/// # Example
///
/// ```rust
/// use route_consolidator::{GpsPoint, geo_utils::is_proximate};
///
/// let p = GpsPoint::new(0.0, 0.0);
/// assert!(is_proximate(&p, &GpsPoint::new(0.0, 0.0009), 0.001));
/// assert!(!is_proximate(&p, &GpsPoint::new(0.0, 0.001), 0.001));
/// ```
#[inline]
pub fn is_proximate(p: &GpsPoint, q: &GpsPoint, tolerance: f64) -> bool {
    planar_distance(p, q) < tolerance
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a point sequence.
///
/// For empty input, returns a bounds with MIN/MAX values that will fail any
/// overlap check.
///
/// # Example
///
/// ```rust
/// use route_consolidator::{GpsPoint, geo_utils};
///
/// let track = vec![
///     GpsPoint::new(51.5000, -0.1300),
///     GpsPoint::new(51.5100, -0.1200),
///     GpsPoint::new(51.5050, -0.1250),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track);
/// assert_eq!(bounds.northeast(), GpsPoint::new(51.5100, -0.1200));
/// assert_eq!(bounds.southwest(), GpsPoint::new(51.5000, -0.1300));
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

/// Check if two bounding boxes can overlap.
///
/// False only when one box's northeast corner is strictly below or strictly
/// left of the other's southwest corner. Boxes that merely touch count as
/// overlapping. O(1).
pub fn boxes_may_overlap(a: &Bounds, b: &Bounds) -> bool {
    !(a.max_lng < b.min_lng
        || b.max_lng < a.min_lng
        || a.max_lat < b.min_lat
        || b.max_lat < a.min_lat)
}

// =============================================================================
// Lengths
// =============================================================================

/// Great-circle distance between two GPS points in meters.
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Total length of a polyline in meters.
///
/// Sums the haversine distance between consecutive points. Empty or
/// single-point polylines return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Per-distance emission intensity.
///
/// A zero (or non-finite) distance yields an intensity of 0 instead of a
/// division by zero.
#[inline]
pub fn emission_intensity(mass: f64, distance: f64) -> f64 {
    if distance == 0.0 || !distance.is_finite() {
        0.0
    } else {
        mass / distance
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_planar_distance() {
        let p = GpsPoint::new(0.0, 0.0);
        let q = GpsPoint::new(3.0, 4.0);
        assert!(approx_eq(planar_distance(&p, &q), 5.0, 1e-12));
    }

    #[test]
    fn test_is_proximate_is_strict() {
        let p = GpsPoint::new(48.0, 16.0);
        let q = GpsPoint::new(48.0, 16.5);
        assert!(!is_proximate(&p, &q, 0.5));
        assert!(is_proximate(&p, &q, 0.5000001));
    }

    #[test]
    fn test_is_proximate_symmetry() {
        let pairs = [
            (GpsPoint::new(48.2, 16.3), GpsPoint::new(48.2009, 16.3002)),
            (GpsPoint::new(-33.9, 151.2), GpsPoint::new(-33.95, 151.21)),
            (GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.0)),
        ];
        for (p, q) in pairs {
            for tol in [0.0, 0.001, 0.015, 0.1] {
                assert_eq!(is_proximate(&p, &q, tol), is_proximate(&q, &p, tol));
            }
        }
    }

    #[test]
    fn test_zero_tolerance_matches_nothing() {
        let p = GpsPoint::new(48.0, 16.0);
        assert!(!is_proximate(&p, &p, 0.0));
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![
            GpsPoint::new(51.50, -0.13),
            GpsPoint::new(51.51, -0.12),
            GpsPoint::new(51.505, -0.125),
        ];
        let bounds = compute_bounds(&track);
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }

    #[test]
    fn test_boxes_overlap_yes() {
        let a = Bounds { min_lat: 51.50, max_lat: 51.52, min_lng: -0.13, max_lng: -0.11 };
        let b = Bounds { min_lat: 51.51, max_lat: 51.53, min_lng: -0.12, max_lng: -0.10 };
        assert!(boxes_may_overlap(&a, &b));
        assert!(boxes_may_overlap(&b, &a));
    }

    #[test]
    fn test_boxes_overlap_touching_edges() {
        let a = Bounds { min_lat: 0.0, max_lat: 1.0, min_lng: 0.0, max_lng: 1.0 };
        let b = Bounds { min_lat: 1.0, max_lat: 2.0, min_lng: 1.0, max_lng: 2.0 };
        assert!(boxes_may_overlap(&a, &b));
    }

    #[test]
    fn test_boxes_overlap_no() {
        let a = Bounds { min_lat: 51.50, max_lat: 51.51, min_lng: -0.13, max_lng: -0.12 };
        let b = Bounds { min_lat: 51.52, max_lat: 51.53, min_lng: -0.11, max_lng: -0.10 };
        assert!(!boxes_may_overlap(&a, &b));
        assert!(!boxes_may_overlap(&b, &a));
    }

    #[test]
    fn test_boxes_disjoint_on_one_axis_only() {
        // Same latitude band, separated in longitude
        let a = Bounds { min_lat: 0.0, max_lat: 1.0, min_lng: 0.0, max_lng: 1.0 };
        let b = Bounds { min_lat: 0.0, max_lat: 1.0, min_lng: 1.5, max_lng: 2.0 };
        assert!(!boxes_may_overlap(&a, &b));
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5000.0));
    }

    #[test]
    fn test_polyline_length_degenerate() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(51.5074, -0.1278)]), 0.0);
    }

    #[test]
    fn test_polyline_length_is_additive() {
        let a = GpsPoint::new(48.20, 16.30);
        let b = GpsPoint::new(48.21, 16.31);
        let c = GpsPoint::new(48.22, 16.30);
        let whole = polyline_length(&[a, b, c]);
        let parts = polyline_length(&[a, b]) + polyline_length(&[b, c]);
        assert!(approx_eq(whole, parts, 1e-6));
    }

    #[test]
    fn test_emission_intensity() {
        assert_eq!(emission_intensity(1000.0, 250.0), 4.0);
        assert_eq!(emission_intensity(1000.0, 0.0), 0.0);
        assert_eq!(emission_intensity(0.0, 10.0), 0.0);
    }
}
