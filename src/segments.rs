//! # Segment Splitter
//!
//! Detects when two routes were driven over the same stretch of road and cuts
//! them at the boundary of that stretch.
//!
//! ## Algorithm
//! 1. Reject pairs whose bounding boxes cannot overlap
//! 2. Entry search: first point of A (in order) proximate to any point of B
//! 3. Exit search: first point of A scanning in reverse proximate to any point
//!    of B (scanning B in reverse as well)
//! 4. No pair at all: disjoint. A single shared point: a crossing, no split
//! 5. Otherwise order the indices on each route, pick the route with the longer
//!    shared index span as the canonical shared piece, pad the cut outward and
//!    emit up to five pieces
//!
//! Proximity is a fixed-tolerance point test, not line-segment intersection.
//! The middle of the shared stretch is never inspected: two routes that meet,
//! diverge and meet again are treated as sharing everything in between.

use crate::geo_utils::{boxes_may_overlap, is_proximate};
use crate::{ConsolidationConfig, GpsPoint, Route};
use log::{debug, warn};

/// A pair of indices, one into each route, whose points are proximate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Index into route A
    pub a: usize,
    /// Index into route B
    pub b: usize,
}

/// First and last proximate pairs found between two routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub entry: Endpoint,
    pub exit: Endpoint,
}

/// A derived piece of a split, or the marker for a degenerate one.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Segment(Route),
    /// Too few points to be drawn; the driver drops it
    Empty,
}

impl Piece {
    fn from_points(points: &[GpsPoint], intensity: f64, min_points: usize) -> Self {
        if points.len() < min_points {
            return Piece::Empty;
        }
        match Route::new(points.to_vec(), intensity) {
            Some(route) => Piece::Segment(route),
            None => Piece::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Piece::Empty)
    }

    pub fn as_route(&self) -> Option<&Route> {
        match self {
            Piece::Segment(route) => Some(route),
            Piece::Empty => None,
        }
    }

    pub fn into_route(self) -> Option<Route> {
        match self {
            Piece::Segment(route) => Some(route),
            Piece::Empty => None,
        }
    }
}

/// The five pieces produced by cutting two overlapping routes.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// The shared stretch, carrying the sum of both intensities
    pub shared: Piece,
    /// A up to the start of the shared stretch
    pub a_before: Piece,
    /// A from the end of the shared stretch
    pub a_after: Piece,
    /// B up to the start of the shared stretch
    pub b_before: Piece,
    /// B from the end of the shared stretch
    pub b_after: Piece,
    /// The shared piece was cut from B's points rather than A's
    pub shared_from_b: bool,
}

impl Split {
    /// All non-empty pieces, shared piece first.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        [&self.shared, &self.a_before, &self.a_after, &self.b_before, &self.b_after]
            .into_iter()
            .filter_map(Piece::as_route)
    }
}

/// Result of trying to merge two routes.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Bounding boxes apart, or no proximate pair of points
    Disjoint,
    /// The routes touch at a single point without a shared run
    Crossing,
    /// Only one of entry/exit could be found; not merged.
    ///
    /// [`find_overlap`] scans the same point pairs in both directions, so it
    /// returns both endpoints or neither and this variant is never produced
    /// by [`attempt_merge`]. The branch only logs a diagnostic.
    Ambiguous,
    /// A shared run was found and both routes were cut
    Split(Split),
}

impl MergeOutcome {
    pub fn is_split(&self) -> bool {
        matches!(self, MergeOutcome::Split(_))
    }
}

/// Search the entry and exit pairs between two point sequences.
///
/// Both searches run independently: the entry scans `a` forward against `b`
/// forward, the exit scans `a` backward against `b` backward. Either both
/// endpoints are found or neither is.
pub fn find_overlap(
    a: &[GpsPoint],
    b: &[GpsPoint],
    tolerance: f64,
) -> (Option<Endpoint>, Option<Endpoint>) {
    let entry = a.iter().enumerate().find_map(|(i, p)| {
        b.iter()
            .position(|q| is_proximate(p, q, tolerance))
            .map(|j| Endpoint { a: i, b: j })
    });

    let exit = a.iter().enumerate().rev().find_map(|(i, p)| {
        b.iter()
            .rposition(|q| is_proximate(p, q, tolerance))
            .map(|j| Endpoint { a: i, b: j })
    });

    (entry, exit)
}

/// Try to merge route `a` with route `b`.
///
/// Only [`MergeOutcome::Split`] changes anything; every other outcome means
/// `a` stays as it is and no pieces were produced.
///
/// # Example
/// ```
/// use route_consolidator::{attempt_merge, ConsolidationConfig, GpsPoint, MergeOutcome, Route};
///
/// let a = Route::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)], 1.0).unwrap();
/// let b = Route::new(vec![GpsPoint::new(5.0, 5.0), GpsPoint::new(5.0, 6.0)], 1.0).unwrap();
///
/// let outcome = attempt_merge(&a, &b, &ConsolidationConfig::default());
/// assert_eq!(outcome, MergeOutcome::Disjoint);
/// ```
pub fn attempt_merge(a: &Route, b: &Route, config: &ConsolidationConfig) -> MergeOutcome {
    if !boxes_may_overlap(a.bounds(), b.bounds()) {
        return MergeOutcome::Disjoint;
    }

    match find_overlap(a.points(), b.points(), config.route_tolerance) {
        (None, None) => MergeOutcome::Disjoint,
        (Some(entry), Some(exit)) => {
            if entry.a == exit.a || entry.b == exit.b {
                return MergeOutcome::Crossing;
            }
            let split = make_segments(a, b, &Overlap { entry, exit }, config);
            debug!(
                "[Segments] Split {}+{} points: shared {:?}..{:?}",
                a.len(),
                b.len(),
                entry,
                exit
            );
            MergeOutcome::Split(split)
        }
        // find_overlap never reports a single endpoint
        (entry, exit) => {
            warn!(
                "[Segments] Only one common point found (entry: {:?}, exit: {:?}), not merging",
                entry, exit
            );
            MergeOutcome::Ambiguous
        }
    }
}

/// Cut two routes around their shared run.
///
/// `overlap` must describe a run of at least two points on both routes.
/// The route with the longer index span provides the geometry of the shared
/// piece; when that route is `b` and it runs opposite to `a`, the shared piece
/// is reversed to follow `a`. Equal spans take `a`'s geometry.
pub fn make_segments(a: &Route, b: &Route, overlap: &Overlap, config: &ConsolidationConfig) -> Split {
    let (a_start, a_end, a_swapped) = ordered(overlap.entry.a, overlap.exit.a);
    let (b_start, b_end, b_swapped) = ordered(overlap.entry.b, overlap.exit.b);

    let (a_cut_start, a_cut_end) = pad(a_start, a_end, a.len(), config);
    let (b_cut_start, b_cut_end) = pad(b_start, b_end, b.len(), config);

    let a_points = a.points();
    let b_points = b.points();
    let min_points = config.min_piece_points;

    let shared_from_b = b_end - b_start > a_end - a_start;
    let shared_points: Vec<GpsPoint> = if shared_from_b {
        let mut points = b_points[b_cut_start..=b_cut_end].to_vec();
        if a_swapped != b_swapped {
            points.reverse();
        }
        points
    } else {
        a_points[a_cut_start..=a_cut_end].to_vec()
    };

    Split {
        shared: Piece::from_points(&shared_points, a.intensity() + b.intensity(), min_points),
        a_before: Piece::from_points(&a_points[..=a_cut_start], a.intensity(), min_points),
        a_after: Piece::from_points(&a_points[a_cut_end..], a.intensity(), min_points),
        b_before: Piece::from_points(&b_points[..=b_cut_start], b.intensity(), min_points),
        b_after: Piece::from_points(&b_points[b_cut_end..], b.intensity(), min_points),
        shared_from_b,
    }
}

/// Order two indices ascending, reporting whether they were swapped.
fn ordered(first: usize, second: usize) -> (usize, usize, bool) {
    if first <= second {
        (first, second, false)
    } else {
        (second, first, true)
    }
}

/// Extend `[start, end]` outward by the configured padding, keeping each
/// padded index at least `padding_margin` points from its end of the route.
fn pad(start: usize, end: usize, len: usize, config: &ConsolidationConfig) -> (usize, usize) {
    let padding = config.boundary_padding;
    let margin = config.padding_margin;

    let start = if start >= padding + margin { start - padding } else { start };
    let end = if end + padding + margin < len { end + padding } else { end };

    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(points: &[(f64, f64)], intensity: f64) -> Route {
        Route::new(points.iter().map(|&(lat, lng)| GpsPoint::new(lat, lng)).collect(), intensity).unwrap()
    }

    fn coords(route: &Route) -> Vec<(f64, f64)> {
        route.points().iter().map(|p| (p.latitude, p.longitude)).collect()
    }

    fn loose() -> ConsolidationConfig {
        ConsolidationConfig {
            route_tolerance: 0.5,
            ..Default::default()
        }
    }

    /// Straight line along the equator, one point per degree of longitude.
    fn line(from: i32, to: i32, intensity: f64) -> Route {
        let points: Vec<(f64, f64)> = if from <= to {
            (from..=to).map(|x| (0.0, x as f64)).collect()
        } else {
            (to..=from).rev().map(|x| (0.0, x as f64)).collect()
        };
        route(&points, intensity)
    }

    #[test]
    fn test_find_overlap_entry_and_exit() {
        let a = line(0, 5, 1.0);
        let b = line(2, 8, 1.0);
        let (entry, exit) = find_overlap(a.points(), b.points(), 0.5);
        assert_eq!(entry, Some(Endpoint { a: 2, b: 0 }));
        assert_eq!(exit, Some(Endpoint { a: 5, b: 3 }));
    }

    #[test]
    fn test_find_overlap_both_or_neither() {
        let shapes = [
            line(0, 5, 1.0),
            line(5, 0, 1.0),
            line(3, 9, 1.0),
            route(&[(0.0, 0.0), (0.0, 1.0), (5.0, 5.0), (0.0, 9.0), (0.0, 10.0)], 1.0),
            route(&[(-1.0, 1.0), (0.0, 1.0), (1.0, 1.0)], 1.0),
            route(&[(0.0, 4.0), (3.0, 4.0)], 1.0),
            route(&[(2.0, 0.0), (2.0, 9.0)], 1.0),
        ];
        for a in &shapes {
            for b in &shapes {
                let (entry, exit) = find_overlap(a.points(), b.points(), 0.5);
                assert_eq!(entry.is_some(), exit.is_some());
                assert_ne!(attempt_merge(a, b, &loose()), MergeOutcome::Ambiguous);
            }
        }
    }

    #[test]
    fn test_find_overlap_none() {
        let a = line(0, 3, 1.0);
        let b = route(&[(1.0, 0.0), (1.0, 3.0)], 1.0);
        assert_eq!(find_overlap(a.points(), b.points(), 0.5), (None, None));
    }

    #[test]
    fn test_scenario_shared_middle() {
        let a = route(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)], 10.0);
        let b = route(&[(0.0, 1.0), (0.0, 2.0), (0.0, 3.0)], 5.0);

        let split = match attempt_merge(&a, &b, &loose()) {
            MergeOutcome::Split(split) => split,
            other => panic!("expected split, got {:?}", other),
        };

        let shared = split.shared.as_route().unwrap();
        assert_eq!(coords(shared), vec![(0.0, 1.0), (0.0, 2.0)]);
        assert_eq!(shared.intensity(), 15.0);
        assert!(!split.shared_from_b);

        let a_before = split.a_before.as_route().unwrap();
        assert_eq!(coords(a_before), vec![(0.0, 0.0), (0.0, 1.0)]);
        assert_eq!(a_before.intensity(), 10.0);

        let b_after = split.b_after.as_route().unwrap();
        assert_eq!(coords(b_after), vec![(0.0, 2.0), (0.0, 3.0)]);
        assert_eq!(b_after.intensity(), 5.0);

        assert!(split.a_after.is_empty());
        assert!(split.b_before.is_empty());
    }

    #[test]
    fn test_disjoint_boxes_never_split() {
        let a = line(0, 3, 1.0);
        let b = route(&[(10.0, 10.0), (10.0, 11.0)], 1.0);
        assert_eq!(attempt_merge(&a, &b, &loose()), MergeOutcome::Disjoint);
    }

    #[test]
    fn test_single_shared_point_is_crossing() {
        // A runs east-west, B runs north-south through A's middle point
        let a = route(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)], 1.0);
        let b = route(&[(-1.0, 1.0), (0.0, 1.0), (1.0, 1.0)], 1.0);
        assert_eq!(attempt_merge(&a, &b, &loose()), MergeOutcome::Crossing);
    }

    #[test]
    fn test_longer_span_provides_shared_geometry() {
        // B has an extra point inside the shared stretch
        let a = route(&[(0.0, 0.0), (0.0, 1.0), (0.0, 3.0), (0.0, 4.0)], 1.0);
        let b = route(&[(0.0, 1.0), (0.0, 2.0), (0.0, 3.0)], 2.0);

        let split = match attempt_merge(&a, &b, &loose()) {
            MergeOutcome::Split(split) => split,
            other => panic!("expected split, got {:?}", other),
        };
        let shared = split.shared.as_route().unwrap();
        assert_eq!(coords(shared), vec![(0.0, 1.0), (0.0, 2.0), (0.0, 3.0)]);
        assert_eq!(shared.intensity(), 3.0);
        assert!(split.shared_from_b);
    }

    #[test]
    fn test_opposite_direction_follows_a() {
        let a = route(&[(0.0, 0.0), (0.0, 1.0), (0.0, 3.0), (0.0, 4.0)], 1.0);
        let b = route(&[(0.0, 3.0), (0.0, 2.0), (0.0, 1.0)], 2.0);

        let split = match attempt_merge(&a, &b, &loose()) {
            MergeOutcome::Split(split) => split,
            other => panic!("expected split, got {:?}", other),
        };
        let shared = split.shared.as_route().unwrap();
        assert_eq!(coords(shared), vec![(0.0, 1.0), (0.0, 2.0), (0.0, 3.0)]);
        assert!(split.b_before.is_empty());
        assert!(split.b_after.is_empty());
    }

    #[test]
    fn test_padding_respects_margin() {
        let config = ConsolidationConfig {
            boundary_padding: 1,
            padding_margin: 10,
            ..loose()
        };
        // Close to both ends: no padding
        assert_eq!(pad(3, 5, 8, &config), (3, 5));
        // Far from both ends: padded outward by one
        assert_eq!(pad(15, 20, 40, &config), (14, 21));
        // Start exactly at margin + padding
        assert_eq!(pad(11, 20, 40, &config), (10, 21));
        // End would land inside the margin
        assert_eq!(pad(15, 29, 40, &config), (14, 29));
    }

    #[test]
    fn test_padded_split_on_long_routes() {
        let config = ConsolidationConfig {
            boundary_padding: 1,
            padding_margin: 10,
            ..loose()
        };
        let a = line(0, 40, 1.0);
        let b = route(&[(5.0, 20.0), (0.0, 20.0), (0.0, 21.0), (0.0, 22.0), (5.0, 22.0)], 1.0);

        let split = match attempt_merge(&a, &b, &config) {
            MergeOutcome::Split(split) => split,
            other => panic!("expected split, got {:?}", other),
        };
        // Span 20..22 on A padded to 19..23; B is too short to pad
        let shared = split.shared.as_route().unwrap();
        assert_eq!(shared.len(), 5);
        assert_eq!(shared.points()[0], GpsPoint::new(0.0, 19.0));
        assert_eq!(split.a_before.as_route().unwrap().len(), 20);
        assert_eq!(split.a_after.as_route().unwrap().len(), 18);
        assert_eq!(split.b_before.as_route().unwrap().len(), 2);
        assert_eq!(split.b_after.as_route().unwrap().len(), 2);
    }

    #[test]
    fn test_min_piece_points_drops_short_pieces() {
        let config = ConsolidationConfig {
            min_piece_points: 3,
            ..loose()
        };
        let a = route(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (0.0, 3.0)], 1.0);
        let b = route(&[(0.0, 1.0), (0.0, 2.0), (0.0, 3.0), (0.0, 4.0)], 1.0);

        let split = match attempt_merge(&a, &b, &config) {
            MergeOutcome::Split(split) => split,
            other => panic!("expected split, got {:?}", other),
        };
        assert_eq!(split.shared.as_route().unwrap().len(), 3);
        assert!(split.a_before.is_empty());
        assert!(split.b_after.is_empty());
        assert_eq!(split.routes().count(), 1);
    }

    #[test]
    fn test_split_conserves_mass() {
        let a = line(0, 6, 4.0);
        let b = line(3, 9, 7.0);
        let config = loose();

        let split = match attempt_merge(&a, &b, &config) {
            MergeOutcome::Split(split) => split,
            other => panic!("expected split, got {:?}", other),
        };
        let before = a.mass() + b.mass();
        let after: f64 = split.routes().map(Route::mass).sum();
        assert!((before - after).abs() / before < 1e-9);
    }
}
