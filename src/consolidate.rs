//! # Polyline Consolidation
//!
//! Folds a queue of candidate routes into a solution set in which no two
//! routes share a run of proximate points.
//!
//! ## Queue discipline
//! Candidates are consumed FIFO. When a candidate overlaps a solution member,
//! the member is replaced by its own remainders while the candidate's
//! remainders go back to the *front* of the queue. A candidate is therefore
//! resolved against the whole current solution before the next input route is
//! looked at, which matters because one route can overlap several solved
//! routes in different places.
//!
//! The shared piece of a split follows whichever route gave it its points. Cut
//! from the member, it replaces part of that member and joins the solution.
//! Cut from the candidate, it may still overlap members further down the
//! solution, so it carries on through them before joining.
//!
//! Every requeued remainder is strictly shorter than the candidate it came
//! from, so the fold always terminates.
//!
//! ## Checkpoints
//! While the queue drains, the solution is handed to a [`CheckpointSink`] each
//! time the queue length drops to a configured milestone. Checkpoints are
//! advisory: a failed write is logged and the batch carries on.

use crate::segments::{attempt_merge, MergeOutcome, Piece};
use crate::{ConsolidationConfig, Route};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::Instant;

/// Destination for intermediate snapshots of a solution.
pub trait CheckpointSink<T> {
    /// Persist `solution` as it stood when `remaining` candidates were left.
    fn write_checkpoint(&mut self, remaining: usize, solution: &[T]) -> crate::Result<()>;
}

/// Sink that discards every checkpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCheckpoints;

impl<T> CheckpointSink<T> for NoCheckpoints {
    fn write_checkpoint(&mut self, _remaining: usize, _solution: &[T]) -> crate::Result<()> {
        Ok(())
    }
}

/// Decides when the queue length has reached a checkpoint milestone.
///
/// A milestone `m` is reached by a step that takes the queue from `prev` to
/// `cur` items when `cur <= m < prev`. Milestones are every positive multiple
/// of the interval plus any explicit lengths. Steps that grow the queue never
/// trigger a checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointSchedule {
    interval: usize,
    milestones: Vec<usize>,
}

impl CheckpointSchedule {
    pub fn new(interval: usize, milestones: &[usize]) -> Self {
        let mut milestones: Vec<usize> = milestones.iter().copied().filter(|&m| m > 0).collect();
        milestones.sort_unstable();
        milestones.dedup();
        Self { interval, milestones }
    }

    pub fn from_config(config: &ConsolidationConfig) -> Self {
        Self::new(config.checkpoint_interval, &config.checkpoint_milestones)
    }

    /// Whether a step from `prev` to `cur` queue items crossed a milestone.
    pub fn is_due(&self, prev: usize, cur: usize) -> bool {
        if cur >= prev {
            return false;
        }
        if self.interval > 0 {
            // Smallest positive multiple of the interval that is >= cur
            let multiple = cur.div_ceil(self.interval).max(1) * self.interval;
            if multiple < prev {
                return true;
            }
        }
        self.milestones.iter().any(|&m| cur <= m && m < prev)
    }
}

/// Result of folding one candidate into the solution.
#[derive(Debug)]
pub struct FoldStep {
    /// The solution after the fold
    pub solution: Vec<Route>,
    /// Unresolved pieces of the candidate
    pub remainders: Vec<Route>,
    /// Number of solution members the candidate was split against
    pub merges: usize,
}

/// Fold one candidate into the solution.
///
/// The candidate is compared against each solution member in order. On a
/// split the member is replaced by its remainders and the candidate's
/// remainders are returned for requeueing. A shared piece cut from the
/// member's points joins the solution and ends the fold. A shared piece cut
/// from the candidate's points takes the candidate's place and is compared
/// against the members that follow, so it never lands on top of one of them.
/// Without a split the candidate joins the solution unchanged.
pub fn fold_route(candidate: Route, solution: Vec<Route>, config: &ConsolidationConfig) -> FoldStep {
    if candidate.len() < config.min_piece_points {
        debug!("[Consolidate] Dropping {}-point candidate", candidate.len());
        return FoldStep {
            solution,
            remainders: Vec::new(),
            merges: 0,
        };
    }

    let mut kept: Vec<Route> = Vec::with_capacity(solution.len() + 2);
    let mut cut: Vec<Route> = Vec::new();
    let mut remainders: Vec<Route> = Vec::new();
    let mut merges = 0;
    // Candidate geometry still being compared
    let mut current = Some(candidate);

    for member in solution {
        let Some(piece) = current.as_ref() else {
            kept.push(member);
            continue;
        };
        let split = match attempt_merge(piece, &member, config) {
            MergeOutcome::Split(split) => split,
            MergeOutcome::Disjoint | MergeOutcome::Crossing | MergeOutcome::Ambiguous => {
                kept.push(member);
                continue;
            }
        };

        merges += 1;
        cut.extend([split.b_before, split.b_after].into_iter().filter_map(Piece::into_route));
        remainders.extend([split.a_before, split.a_after].into_iter().filter_map(Piece::into_route));
        current = if split.shared_from_b {
            cut.extend(split.shared.into_route());
            None
        } else {
            split.shared.into_route()
        };
    }

    kept.extend(cut);
    kept.extend(current);
    FoldStep {
        solution: kept,
        remainders,
        merges,
    }
}

/// Consolidate candidate routes into a disjoint solution set.
///
/// # Example
/// ```
/// use route_consolidator::{consolidate, ConsolidationConfig, GpsPoint, Route};
///
/// let a = Route::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)], 2.0).unwrap();
/// let b = Route::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)], 3.0).unwrap();
///
/// let config = ConsolidationConfig { route_tolerance: 0.5, ..Default::default() };
/// let solution = consolidate(vec![a, b], &config);
/// assert_eq!(solution.len(), 1);
/// assert_eq!(solution[0].intensity(), 5.0);
/// ```
pub fn consolidate(candidates: Vec<Route>, config: &ConsolidationConfig) -> Vec<Route> {
    consolidate_with_checkpoints(candidates, config, &mut NoCheckpoints)
}

/// Consolidate candidate routes, writing checkpoints to `sink` at the
/// milestones configured in `config`.
pub fn consolidate_with_checkpoints<S>(
    candidates: Vec<Route>,
    config: &ConsolidationConfig,
    sink: &mut S,
) -> Vec<Route>
where
    S: CheckpointSink<Route> + ?Sized,
{
    let start = Instant::now();
    let input_count = candidates.len();
    let schedule = CheckpointSchedule::from_config(config);

    let mut queue: VecDeque<Route> = candidates
        .into_iter()
        .filter(|route| route.len() >= config.min_piece_points)
        .collect();
    let mut solution: Vec<Route> = Vec::new();
    let mut merges = 0usize;

    info!(
        "[Consolidate] Folding {} routes (tolerance {}°, checkpoint every {})",
        queue.len(),
        config.route_tolerance,
        config.checkpoint_interval
    );

    while let Some(candidate) = queue.pop_front() {
        let prev = queue.len() + 1;

        let step = fold_route(candidate, solution, config);
        solution = step.solution;
        merges += step.merges;
        // Front of the queue, keeping route order
        for remainder in step.remainders.into_iter().rev() {
            queue.push_front(remainder);
        }

        if schedule.is_due(prev, queue.len()) {
            checkpoint(sink, queue.len(), &solution);
        }
    }

    info!(
        "[Consolidate] {} input routes -> {} segments ({} merges) in {}ms",
        input_count,
        solution.len(),
        merges,
        start.elapsed().as_millis()
    );

    solution
}

pub(crate) fn checkpoint<T, S>(sink: &mut S, remaining: usize, solution: &[T])
where
    S: CheckpointSink<T> + ?Sized,
{
    match sink.write_checkpoint(remaining, solution) {
        Ok(()) => info!(
            "[Checkpoint] {} items written with {} candidates remaining",
            solution.len(),
            remaining
        ),
        Err(e) => warn!("[Checkpoint] Write at {} remaining failed: {}", remaining, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    fn line(lat: f64, from: i32, to: i32, intensity: f64) -> Route {
        Route::new((from..=to).map(|x| GpsPoint::new(lat, x as f64)).collect(), intensity).unwrap()
    }

    fn loose() -> ConsolidationConfig {
        ConsolidationConfig {
            route_tolerance: 0.5,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(usize, usize)>,
    }

    impl CheckpointSink<Route> for Recorder {
        fn write_checkpoint(&mut self, remaining: usize, solution: &[Route]) -> crate::Result<()> {
            self.writes.push((remaining, solution.len()));
            Ok(())
        }
    }

    struct Failing;

    impl CheckpointSink<Route> for Failing {
        fn write_checkpoint(&mut self, _remaining: usize, _solution: &[Route]) -> crate::Result<()> {
            Err(crate::ConsolidationError::config("disk full"))
        }
    }

    #[test]
    fn test_schedule_interval() {
        let schedule = CheckpointSchedule::new(1000, &[]);
        assert!(schedule.is_due(1001, 1000));
        assert!(!schedule.is_due(1000, 999));
        assert!(schedule.is_due(2500, 1999));
        assert!(!schedule.is_due(999, 1001));
        assert!(!schedule.is_due(1, 0));
    }

    #[test]
    fn test_schedule_milestones() {
        let schedule = CheckpointSchedule::new(0, &[5000, 250, 0]);
        assert!(schedule.is_due(5001, 5000));
        assert!(schedule.is_due(251, 250));
        assert!(!schedule.is_due(5000, 4999));
        assert!(!schedule.is_due(1, 0));
    }

    #[test]
    fn test_fold_into_empty_solution() {
        let step = fold_route(line(0.0, 0, 3, 1.0), Vec::new(), &loose());
        assert_eq!(step.solution.len(), 1);
        assert!(step.remainders.is_empty());
    }

    #[test]
    fn test_fold_split_requeues_candidate_remainders() {
        let member = line(0.0, 0, 4, 1.0);
        let candidate = line(0.0, 2, 8, 2.0);
        let step = fold_route(candidate, vec![member], &loose());

        // member's head and the shared stretch stay in the solution
        assert_eq!(step.solution.len(), 2);
        assert_eq!(step.merges, 1);
        assert!(step.solution.iter().any(|r| r.intensity() == 3.0));
        // candidate's tail waits in the queue
        assert_eq!(step.remainders.len(), 1);
        assert_eq!(step.remainders[0].points()[0], GpsPoint::new(0.0, 4.0));
        assert_eq!(step.remainders[0].intensity(), 2.0);
    }

    #[test]
    fn test_candidate_shared_piece_checked_against_later_members() {
        // Detour that meets the equator only at both ends, then a short
        // equator stretch inside the detour's bounding box
        let detour = Route::new(
            vec![
                GpsPoint::new(0.0, 0.0),
                GpsPoint::new(0.0, 1.0),
                GpsPoint::new(5.0, 5.0),
                GpsPoint::new(0.0, 9.0),
                GpsPoint::new(0.0, 10.0),
            ],
            1.0,
        )
        .unwrap();
        let middle = line(0.0, 4, 6, 2.0);

        let step = fold_route(line(0.0, 0, 10, 4.0), vec![detour, middle], &loose());

        assert_eq!(step.merges, 2);
        // Only the stretch over `middle` is placed; it carries all three
        assert_eq!(step.solution.len(), 1);
        assert_eq!(step.solution[0].points()[0], GpsPoint::new(0.0, 4.0));
        assert_eq!(step.solution[0].intensity(), 7.0);
        // Candidate+detour on both sides of it wait in the queue
        let heads: Vec<f64> = step.remainders.iter().map(|r| r.points()[0].longitude).collect();
        assert_eq!(heads, vec![0.0, 6.0]);
        assert!(step.remainders.iter().all(|r| r.intensity() == 5.0));
    }

    #[test]
    fn test_member_shared_piece_joins_solution() {
        // Member has the longer shared span, so its points are kept
        let member = Route::new(
            vec![
                GpsPoint::new(0.0, 1.0),
                GpsPoint::new(0.0, 2.0),
                GpsPoint::new(0.0, 3.0),
            ],
            2.0,
        )
        .unwrap();
        let other = line(10.0, 0, 2, 1.0);
        let candidate = Route::new(
            vec![
                GpsPoint::new(0.0, 0.0),
                GpsPoint::new(0.0, 1.0),
                GpsPoint::new(0.0, 3.0),
                GpsPoint::new(0.0, 4.0),
            ],
            1.0,
        )
        .unwrap();

        let step = fold_route(candidate, vec![other.clone(), member], &loose());

        assert_eq!(step.merges, 1);
        assert_eq!(step.solution.len(), 2);
        assert_eq!(step.solution[0], other);
        assert_eq!(step.solution[1].len(), 3);
        assert_eq!(step.solution[1].intensity(), 3.0);
        assert_eq!(step.remainders.len(), 2);
    }

    #[test]
    fn test_identical_routes_sum() {
        let solution = consolidate(vec![line(0.0, 0, 5, 1.0), line(0.0, 0, 5, 2.0), line(0.0, 0, 5, 4.0)], &loose());
        assert_eq!(solution.len(), 1);
        assert_eq!(solution[0].intensity(), 7.0);
    }

    #[test]
    fn test_candidate_overlapping_two_members() {
        // Two separate solved stretches, then one route covering both
        let west = line(0.0, 0, 3, 1.0);
        let east = line(0.0, 10, 13, 1.0);
        let long = line(0.0, 0, 13, 5.0);

        let solution = consolidate(vec![west, east, long], &loose());

        let mut intensities: Vec<f64> = solution.iter().map(Route::intensity).collect();
        intensities.sort_by(|a, b| a.partial_cmp(b).unwrap());
        // west+long, gap from long alone, east+long
        assert_eq!(intensities, vec![5.0, 6.0, 6.0]);
    }

    #[test]
    fn test_non_overlapping_routes_untouched() {
        let a = line(0.0, 0, 3, 1.0);
        let b = line(10.0, 0, 3, 2.0);
        let solution = consolidate(vec![a.clone(), b.clone()], &loose());
        assert_eq!(solution, vec![a, b]);
    }

    #[test]
    fn test_checkpoints_written_at_milestones() {
        let config = ConsolidationConfig {
            checkpoint_interval: 2,
            ..loose()
        };
        // Disjoint routes: the queue shrinks by one per step
        let routes: Vec<Route> = (0..5).map(|i| line(i as f64 * 10.0, 0, 2, 1.0)).collect();

        let mut recorder = Recorder::default();
        let solution = consolidate_with_checkpoints(routes, &config, &mut recorder);

        assert_eq!(solution.len(), 5);
        // queue 5 -> 4 (milestone 4), 3 -> 2 (milestone 2)
        assert_eq!(recorder.writes, vec![(4, 1), (2, 3)]);
    }

    #[test]
    fn test_failed_checkpoint_does_not_abort() {
        let config = ConsolidationConfig {
            checkpoint_interval: 1,
            ..loose()
        };
        let routes: Vec<Route> = (0..3).map(|i| line(i as f64 * 10.0, 0, 2, 1.0)).collect();
        let solution = consolidate_with_checkpoints(routes, &config, &mut Failing);
        assert_eq!(solution.len(), 3);
    }
}
