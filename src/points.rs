//! Point-cloud consolidation.
//!
//! Degrades every route to its points and merges points that lie within the
//! point tolerance of each other. The result is a tolerance net: no two
//! records are within tolerance of each other, and each record carries the
//! summed intensity of every route that passed near it.
//!
//! Used when rendering at a resolution where path shape does not matter.
//! Existing records are looked up through an R-tree, so a fold costs
//! O(group size × log(solution size)) for matching plus O(group size²) for
//! deduplicating the group's new points against each other; the latter is the
//! scaling limit for very dense routes.

use crate::consolidate::{checkpoint, CheckpointSchedule, CheckpointSink, NoCheckpoints};
use crate::geo_utils::is_proximate;
use crate::{ConsolidationConfig, GpsPoint, PointGroup};
use log::info;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::Instant;

/// A representative point with its accumulated intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub point: GpsPoint,
    pub intensity: f64,
}

// =============================================================================
// R-tree Indexed Point for Spatial Queries
// =============================================================================

/// Position of a record in the cloud, for R-tree queries
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// The point-pipeline solution set.
#[derive(Clone, Default)]
pub struct PointCloud {
    records: Vec<PointRecord>,
    index: RTree<IndexedPoint>,
}

impl fmt::Debug for PointCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointCloud")
            .field("records", &self.records)
            .finish()
    }
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[PointRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<PointRecord> {
        self.records
    }

    /// Indices of every record strictly within `tolerance` of `point`.
    fn matches(&self, point: &GpsPoint, tolerance: f64) -> Vec<usize> {
        self.index
            .locate_within_distance([point.latitude, point.longitude], tolerance * tolerance)
            .filter(|candidate| {
                is_proximate(&GpsPoint::new(candidate.lat, candidate.lng), point, tolerance)
            })
            .map(|candidate| candidate.idx)
            .collect()
    }

    fn insert(&mut self, record: PointRecord) {
        let idx = self.records.len();
        self.index.insert(IndexedPoint {
            idx,
            lat: record.point.latitude,
            lng: record.point.longitude,
        });
        self.records.push(record);
    }
}

/// Keep one representative per cluster of mutually close points.
///
/// Iterates a fixed snapshot of `points` and builds a new collection: a point
/// is kept unless it is within `tolerance` of an already kept one, so the
/// first-encountered point of each cluster wins.
pub fn dedup_within_tolerance(points: &[GpsPoint], tolerance: f64) -> Vec<GpsPoint> {
    let mut kept: Vec<GpsPoint> = Vec::new();
    for p in points {
        if !kept.iter().any(|k| is_proximate(p, k, tolerance)) {
            kept.push(*p);
        }
    }
    kept
}

/// Fold one route's points into the cloud.
///
/// Every existing record within tolerance of at least one point of the group
/// gains `contributed_intensity` once per route, not once per matching point:
/// a record hit by three of the group's points is incremented a single time.
/// A point near several records increments each of them. Points with no
/// existing match are deduplicated among themselves and added as new records
/// carrying `contributed_intensity`.
///
/// # Example
/// ```
/// use route_consolidator::{fold_point, GpsPoint, PointCloud};
///
/// let mut cloud = PointCloud::new();
/// for _ in 0..3 {
///     cloud = fold_point(&[GpsPoint::new(48.2, 16.3)], 1.0, cloud, 0.015);
/// }
/// assert_eq!(cloud.len(), 1);
/// assert_eq!(cloud.records()[0].intensity, 3.0);
/// ```
pub fn fold_point(
    group: &[GpsPoint],
    contributed_intensity: f64,
    mut solution: PointCloud,
    tolerance: f64,
) -> PointCloud {
    let mut matched: HashSet<usize> = HashSet::new();
    let mut unmatched: Vec<GpsPoint> = Vec::new();

    for point in group {
        let hits = solution.matches(point, tolerance);
        if hits.is_empty() {
            unmatched.push(*point);
        } else {
            matched.extend(hits);
        }
    }

    for idx in matched {
        solution.records[idx].intensity += contributed_intensity;
    }

    for point in dedup_within_tolerance(&unmatched, tolerance) {
        solution.insert(PointRecord {
            point,
            intensity: contributed_intensity,
        });
    }

    solution
}

/// Consolidate point groups into a tolerance net.
pub fn consolidate_points(groups: Vec<PointGroup>, config: &ConsolidationConfig) -> Vec<PointRecord> {
    consolidate_points_with_checkpoints(groups, config, &mut NoCheckpoints)
}

/// Consolidate point groups, writing checkpoints to `sink` at the milestones
/// configured in `config`.
pub fn consolidate_points_with_checkpoints<S>(
    groups: Vec<PointGroup>,
    config: &ConsolidationConfig,
    sink: &mut S,
) -> Vec<PointRecord>
where
    S: CheckpointSink<PointRecord> + ?Sized,
{
    let start = Instant::now();
    let schedule = CheckpointSchedule::from_config(config);
    let mut queue: VecDeque<PointGroup> = groups.into_iter().collect();
    let mut cloud = PointCloud::new();
    let mut contributed = 0usize;

    info!(
        "[Points] Folding {} point groups (tolerance {}°)",
        queue.len(),
        config.point_tolerance
    );

    while let Some(group) = queue.pop_front() {
        let prev = queue.len() + 1;
        contributed += group.points.len();
        cloud = fold_point(&group.points, group.intensity, cloud, config.point_tolerance);

        if schedule.is_due(prev, queue.len()) {
            checkpoint(sink, queue.len(), cloud.records());
        }
    }

    info!(
        "[Points] {} input points -> {} records in {}ms",
        contributed,
        cloud.len(),
        start.elapsed().as_millis()
    );

    cloud.into_records()
}
