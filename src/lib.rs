//! # Route Consolidator
//!
//! Consolidation of emission-annotated road routes into a compact,
//! non-overlapping representation for map rendering.
//!
//! Each input route is one origin-destination polyline carrying a total
//! emission mass and a traversal distance. Independently computed routes often
//! share stretches of road; this library folds them into either:
//! - a disjoint set of route segments, where a shared stretch carries the sum of
//!   the intensities of every route driven over it ([`consolidate`]), or
//! - a disjoint point cloud, where each representative point carries the summed
//!   intensity of every route passing near it ([`consolidate_points`]).
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel ingestion with rayon
//! - **`http`** - Enable fetching route geometry from a directions provider
//! - **`cli`** - Build the `route-consolidator` batch runner
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_consolidator::{consolidate, ConsolidationConfig, GpsPoint, Route};
//!
//! let a = Route::new(
//!     vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0), GpsPoint::new(0.0, 2.0)],
//!     10.0,
//! ).unwrap();
//! let b = Route::new(
//!     vec![GpsPoint::new(0.0, 1.0), GpsPoint::new(0.0, 2.0), GpsPoint::new(0.0, 3.0)],
//!     5.0,
//! ).unwrap();
//!
//! let config = ConsolidationConfig { route_tolerance: 0.5, ..Default::default() };
//! let solution = consolidate(vec![a, b], &config);
//!
//! // (0,0)-(0,1) @10, (0,1)-(0,2) @15, (0,2)-(0,3) @5
//! assert_eq!(solution.len(), 3);
//! assert!(solution.iter().any(|r| r.intensity() == 15.0));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub use error::{ConsolidationError, Result};

// Shared geometric primitives
pub mod geo_utils;

// Segment splitter (overlap detection and cutting)
pub mod segments;
pub use segments::{
    attempt_merge, find_overlap, make_segments, Endpoint, MergeOutcome, Overlap, Piece, Split,
};

// Polyline fold driver
pub mod consolidate;
pub use consolidate::{
    consolidate, consolidate_with_checkpoints, fold_route, CheckpointSchedule, CheckpointSink,
    FoldStep, NoCheckpoints,
};

// Point-cloud consolidation
pub mod points;
pub use points::{
    consolidate_points, consolidate_points_with_checkpoints, dedup_within_tolerance, fold_point,
    PointCloud, PointRecord,
};

// Delimited wire format and checkpoint files
pub mod io;
pub use io::CsvCheckpointer;

// Map-ready output
pub mod render;

// HTTP module for route acquisition
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{DirectionsFetcher, FetchResult, TripRecord};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use route_consolidator::GpsPoint;
/// let point = GpsPoint::new(48.2082, 16.3738); // Vienna
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// `[lat, lng]` pair, the order used by the wire format.
    pub fn to_pair(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

impl From<[f64; 2]> for GpsPoint {
    fn from(pair: [f64; 2]) -> Self {
        GpsPoint::new(pair[0], pair[1])
    }
}

/// Axis-aligned bounding box of a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Northeast corner (maximum latitude and longitude).
    pub fn northeast(&self) -> GpsPoint {
        GpsPoint::new(self.max_lat, self.max_lng)
    }

    /// Southwest corner (minimum latitude and longitude).
    pub fn southwest(&self) -> GpsPoint {
        GpsPoint::new(self.min_lat, self.min_lng)
    }
}

/// An ordered polyline with an emission intensity attached to the whole route.
///
/// The bounding box and the length are derived from the points at
/// construction and cannot drift from them: the points are not mutable
/// through this type, a split produces new routes instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    points: Vec<GpsPoint>,
    bounds: Bounds,
    intensity: f64,
    distance: f64,
}

impl Route {
    /// Create a route from its points and intensity.
    ///
    /// Returns `None` for fewer than 2 points: such a route is empty and
    /// never enters consolidation.
    ///
    /// # Example
    /// ```
    /// use route_consolidator::{GpsPoint, Route};
    ///
    /// assert!(Route::new(vec![GpsPoint::new(48.2, 16.3)], 1.0).is_none());
    ///
    /// let route = Route::new(
    ///     vec![GpsPoint::new(48.20, 16.30), GpsPoint::new(48.21, 16.32)],
    ///     3.5,
    /// ).unwrap();
    /// assert_eq!(route.bounds().northeast(), GpsPoint::new(48.21, 16.32));
    /// ```
    pub fn new(points: Vec<GpsPoint>, intensity: f64) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let bounds = geo_utils::compute_bounds(&points);
        let distance = geo_utils::polyline_length(&points);
        Some(Self {
            points,
            bounds,
            intensity,
            distance,
        })
    }

    pub fn points(&self) -> &[GpsPoint] {
        &self.points
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Emission per meter attributed to every part of this route.
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Haversine length of the polyline in meters.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Emission mass carried by the route (`intensity × distance`).
    pub fn mass(&self) -> f64 {
        self.intensity * self.distance
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the route has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<GpsPoint> {
        self.points
    }
}

/// One upstream route record: provider geometry plus emission totals.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    /// Provider-reported northeast corner
    pub northeast: GpsPoint,
    /// Provider-reported southwest corner
    pub southwest: GpsPoint,
    /// Ordered route geometry
    pub points: Vec<GpsPoint>,
    /// Total emitted mass over the route
    pub mass: f64,
    /// Physical distance of the route as reported upstream
    pub distance: f64,
}

impl RouteRecord {
    /// Per-distance intensity; zero when the distance is zero.
    pub fn intensity(&self) -> f64 {
        geo_utils::emission_intensity(self.mass, self.distance)
    }

    /// Convert into a [`Route`], dropping invalid coordinates.
    ///
    /// Returns `None` if fewer than 2 valid points remain.
    pub fn to_route(&self) -> Option<Route> {
        let points: Vec<GpsPoint> = self.points.iter().filter(|p| p.is_valid()).copied().collect();
        Route::new(points, self.intensity())
    }
}

/// A group of points contributed by one route to the point pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGroup {
    pub points: Vec<GpsPoint>,
    pub intensity: f64,
}

/// Configuration for both consolidation pipelines.
///
/// The two tolerances are independent and dimensionally unrelated: route
/// matching uses a tight tolerance so only points on the same road coincide,
/// point clustering uses a coarse one chosen for the rendering resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Planar tolerance (degrees) under which two route points are the same place.
    /// Default: 0.001 (roughly 100 m at mid latitudes)
    pub route_tolerance: f64,

    /// Planar tolerance (degrees) for clustering points in the point pipeline.
    /// Default: 0.015
    pub point_tolerance: f64,

    /// Number of points the shared run is extended outward on each side before cutting.
    /// Default: 1
    pub boundary_padding: usize,

    /// Padding is only applied while the padded index stays at least this many
    /// points away from the corresponding end of the route.
    /// Default: 10
    pub padding_margin: usize,

    /// Pieces with fewer points than this are dropped.
    /// Default: 2
    pub min_piece_points: usize,

    /// Write a checkpoint whenever the candidate queue drops to a multiple of
    /// this length. 0 disables interval checkpoints.
    /// Default: 1000
    pub checkpoint_interval: usize,

    /// Additional queue lengths at which to checkpoint.
    /// Default: none
    pub checkpoint_milestones: Vec<usize>,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            route_tolerance: 0.001,
            point_tolerance: 0.015,
            boundary_padding: 1,
            padding_margin: 10,
            min_piece_points: 2,
            checkpoint_interval: 1000,
            checkpoint_milestones: Vec::new(),
        }
    }
}

impl ConsolidationConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.route_tolerance.is_finite() && self.route_tolerance > 0.0) {
            return Err(ConsolidationError::config(format!(
                "route_tolerance must be positive, got {}",
                self.route_tolerance
            )));
        }
        if !(self.point_tolerance.is_finite() && self.point_tolerance > 0.0) {
            return Err(ConsolidationError::config(format!(
                "point_tolerance must be positive, got {}",
                self.point_tolerance
            )));
        }
        if self.min_piece_points < 2 {
            return Err(ConsolidationError::config(format!(
                "min_piece_points must be at least 2, got {}",
                self.min_piece_points
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Ingestion
// ============================================================================

/// Turn upstream records into consolidation candidates.
///
/// Intensity is derived as `mass / distance`. Records with fewer than 2 valid
/// points are dropped here, so the engine never sees malformed geometry.
///
/// # Example
/// ```
/// use route_consolidator::{prepare_routes, GpsPoint, RouteRecord};
///
/// let single = RouteRecord {
///     northeast: GpsPoint::new(48.2, 16.3),
///     southwest: GpsPoint::new(48.2, 16.3),
///     points: vec![GpsPoint::new(48.2, 16.3)],
///     mass: 100.0,
///     distance: 0.0,
/// };
/// assert!(prepare_routes(&[single]).is_empty());
/// ```
pub fn prepare_routes(records: &[RouteRecord]) -> Vec<Route> {
    let routes: Vec<Route> = records.iter().filter_map(RouteRecord::to_route).collect();
    log_dropped(records.len(), routes.len());
    routes
}

/// Same as [`prepare_routes`] but converts records in parallel.
///
/// Output order matches input order, so consolidation results are identical.
#[cfg(feature = "parallel")]
pub fn prepare_routes_parallel(records: &[RouteRecord]) -> Vec<Route> {
    use rayon::prelude::*;

    let routes: Vec<Route> = records.par_iter().filter_map(RouteRecord::to_route).collect();
    log_dropped(records.len(), routes.len());
    routes
}

fn log_dropped(total: usize, kept: usize) {
    if kept < total {
        log::debug!(
            "[Ingest] Dropped {} of {} records with fewer than 2 valid points",
            total - kept,
            total
        );
    }
}

/// Turn upstream records into point groups for [`consolidate_points`].
///
/// Each group keeps the record's valid points and its derived intensity.
/// Records without a single valid point are dropped.
pub fn prepare_point_groups(records: &[RouteRecord]) -> Vec<PointGroup> {
    records
        .iter()
        .filter_map(|record| {
            let points: Vec<GpsPoint> =
                record.points.iter().filter(|p| p.is_valid()).copied().collect();
            if points.is_empty() {
                None
            } else {
                Some(PointGroup {
                    points,
                    intensity: record.intensity(),
                })
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
