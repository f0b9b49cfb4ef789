//! # Greedy spatial grouping
//!
//! First pass of the tracker: turn an unassigned pool of per-frame detections into candidate
//! tracks by repeated **nearest-per-frame** clustering around a seed.
//!
//! ## Algorithm
//! -----------------
//! While the pool is not empty:
//!
//! 1. The first pooled detection is the **seed**; distances from the seed to the pool are
//!    computed.
//! 2. **Pass 1.** In every frame only the detection(s) closest to the seed are kept. The
//!    `size_quantile` Major axis of that set is the size proxy; members farther than the proxy
//!    are dropped (proximity filter).
//! 3. **Pass 2.** The centroid of the pass-1 survivors replaces the seed and the
//!    nearest-per-frame + proximity filter is repeated against the whole pool. Members whose
//!    Major axis exceeds `size_consistency_factor × median Major` of the pass-2 set are then
//!    dropped (size filter).
//! 4. An empty pass-2 group falls back to the singleton `{seed}`.
//! 5. The group leaves the pool.
//!
//! Groups covering at least `coverage_fraction × total_frames` detections become tracks and
//! receive a random permutation of `0..n_tracks` as IDs, drawn from the caller's RNG so that
//! discovery order never leaks into ID values. Every other detection goes to the unassigned
//! bucket. Group membership itself is deterministic for a given input order.
//!
//! ## Edge cases
//! -----------------
//! * Frames with several detections at exactly the same minimum distance keep all of them; the
//!   refinement engine later resolves such same-frame duplicates.
//! * When no group reaches the coverage threshold the result is an all-unassigned dataset and a
//!   warning is logged. This is not an error: downstream consumers handle zero tracks.
use std::collections::HashMap;

use ahash::RandomState;
use log::{debug, info, warn};
use nalgebra::Point2;
use rand::{seq::SliceRandom, Rng};

use crate::{
    constants::{FrameIndex, Pixel, TrackId, UNASSIGNED},
    detections::{Detection, TrajectoryDataset},
    geometry::{centroid, distance, median, quantile},
    params::TrackingParams,
};

#[cfg(feature = "progress")]
use crate::progress_bar::stage_bar;

/// Summary of one grouping run, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupingSummary {
    /// Groups formed, accepted or not.
    pub groups: usize,
    /// Groups promoted to tracks.
    pub tracks: usize,
    /// Detections sent to the unassigned bucket.
    pub rejected_detections: usize,
    /// Seeds that ended as singleton groups because pass 2 came back empty.
    pub singleton_fallbacks: usize,
}

/// Rows of the pool that are closest to `origin` within their frame, with their distance.
///
/// Ties at the frame minimum are all kept. Output follows pool order.
fn nearest_per_frame(
    detections: &[Detection],
    pool: &[usize],
    origin: &Point2<Pixel>,
) -> Vec<(usize, Pixel)> {
    let dists: Vec<(usize, Pixel)> = pool
        .iter()
        .map(|&row| (row, distance(origin, &detections[row].position)))
        .collect();

    let mut frame_min: HashMap<FrameIndex, Pixel, RandomState> = HashMap::default();
    for &(row, d) in &dists {
        frame_min
            .entry(detections[row].frame)
            .and_modify(|m| *m = m.min(d))
            .or_insert(d);
    }

    dists
        .into_iter()
        .filter(|&(row, d)| frame_min.get(&detections[row].frame) == Some(&d))
        .collect()
}

/// Drop candidates farther than the `q` quantile of their Major axis.
fn proximity_filter(
    detections: &[Detection],
    candidates: Vec<(usize, Pixel)>,
    q: f64,
) -> Vec<(usize, Pixel)> {
    let majors: Vec<f64> = candidates
        .iter()
        .map(|&(row, _)| detections[row].major)
        .collect();
    let Some(size) = quantile(&majors, q) else {
        return candidates;
    };
    candidates.into_iter().filter(|&(_, d)| d <= size).collect()
}

/// Form one group around the first pooled detection.
///
/// Return
/// ----------
/// * The member rows and whether the singleton fallback was taken.
fn grow_group(
    detections: &[Detection],
    pool: &[usize],
    params: &TrackingParams,
) -> (Vec<usize>, bool) {
    let seed = pool[0];

    // pass 1: around the seed
    let pass1 = nearest_per_frame(detections, pool, &detections[seed].position);
    let pass1 = proximity_filter(detections, pass1, params.size_quantile);

    let Some(center) = centroid(pass1.iter().map(|&(row, _)| &detections[row].position)) else {
        return (vec![seed], true);
    };

    // pass 2: around the centroid of pass 1
    let pass2 = nearest_per_frame(detections, pool, &center);
    let pass2 = proximity_filter(detections, pass2, params.size_quantile);

    let majors: Vec<f64> = pass2.iter().map(|&(row, _)| detections[row].major).collect();
    let members: Vec<usize> = match median(&majors) {
        Some(med) => pass2
            .into_iter()
            .filter(|&(row, _)| detections[row].major <= params.size_consistency_factor * med)
            .map(|(row, _)| row)
            .collect(),
        None => Vec::new(),
    };

    if members.is_empty() {
        (vec![seed], true)
    } else {
        (members, false)
    }
}

/// Partition every detection of `dataset` into greedy groups.
///
/// Deterministic: the same input order always yields the same groups, in discovery order.
/// Row indices refer to `dataset.detections()`.
pub fn greedy_groups(dataset: &TrajectoryDataset, params: &TrackingParams) -> Vec<Vec<usize>> {
    greedy_groups_with_fallbacks(dataset, params).0
}

fn greedy_groups_with_fallbacks(
    dataset: &TrajectoryDataset,
    params: &TrackingParams,
) -> (Vec<Vec<usize>>, usize) {
    let detections = dataset.detections();
    let mut pool: Vec<usize> = (0..detections.len()).collect();
    let mut taken = vec![false; detections.len()];
    let mut groups = Vec::new();
    let mut fallbacks = 0;

    #[cfg(feature = "progress")]
    let pb = stage_bar(detections.len() as u64, "grouping");

    while !pool.is_empty() {
        let (members, fallback) = grow_group(detections, &pool, params);
        if fallback {
            debug!(
                "Grouper: empty second pass around detection {}, keeping it as a singleton",
                detections[pool[0]].index
            );
            fallbacks += 1;
        }

        for &row in &members {
            taken[row] = true;
        }
        pool.retain(|&row| !taken[row]);

        #[cfg(feature = "progress")]
        pb.inc(members.len() as u64);

        groups.push(members);
    }

    #[cfg(feature = "progress")]
    pb.finish_and_clear();

    (groups, fallbacks)
}

/// Random permutation of the track IDs `0..n`.
pub fn permute_track_ids<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<TrackId> {
    let mut ids: Vec<TrackId> = (0..n as TrackId).collect();
    ids.shuffle(rng);
    ids
}

/// Group the detections of `dataset` into initial tracks.
///
/// Arguments
/// -----------------
/// * `dataset`: detections to group; existing track IDs are ignored.
/// * `params`: grouping filters and `coverage_fraction`.
/// * `rng`: source of the track-ID permutation.
///
/// Return
/// ----------
/// * A copy of `dataset` (same row order) where every detection carries a track ID or
///   [`UNASSIGNED`], and a [`GroupingSummary`].
pub fn group_detections<R: Rng + ?Sized>(
    dataset: &TrajectoryDataset,
    params: &TrackingParams,
    rng: &mut R,
) -> (TrajectoryDataset, GroupingSummary) {
    let (groups, singleton_fallbacks) = greedy_groups_with_fallbacks(dataset, params);
    let min_size = params.coverage_fraction * dataset.total_frames() as f64;

    let (good, bad): (Vec<_>, Vec<_>) = groups
        .iter()
        .partition(|members| members.len() as f64 >= min_size);

    let ids = permute_track_ids(good.len(), rng);

    let mut grouped = dataset.clone();
    for d in grouped.detections_mut() {
        d.track_id = UNASSIGNED;
    }
    for (members, &id) in good.iter().zip(&ids) {
        for &row in members.iter() {
            grouped.set_track(row, id);
        }
    }

    let summary = GroupingSummary {
        groups: groups.len(),
        tracks: good.len(),
        rejected_detections: bad.iter().map(|members| members.len()).sum(),
        singleton_fallbacks,
    };

    if summary.tracks == 0 {
        warn!(
            "Grouper: no group covers {:.1} of {} frames, every detection is unassigned",
            min_size,
            dataset.total_frames()
        );
    } else {
        info!(
            "Grouper: {} groups, {} tracks, {} rejected detections",
            summary.groups, summary.tracks, summary.rejected_detections
        );
    }

    (grouped, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// Two clusters far apart, one detection per frame each.
    fn two_clusters(frames: u32) -> TrajectoryDataset {
        let mut detections = Vec::new();
        for frame in 1..=frames {
            let jitter = frame as f64 * 0.2;
            detections.push(Detection::new(
                detections.len(),
                frame,
                10.0 + jitter,
                10.0,
                8.0,
                3.0,
                20.0,
            ));
            detections.push(Detection::new(
                detections.len(),
                frame,
                200.0 - jitter,
                150.0,
                8.5,
                3.0,
                70.0,
            ));
        }
        TrajectoryDataset::new(detections, frames)
    }

    #[test]
    fn test_nearest_per_frame_keeps_ties() {
        let detections = vec![
            Detection::new(0, 1, 1.0, 0.0, 5.0, 2.0, 0.0),
            Detection::new(1, 1, -1.0, 0.0, 5.0, 2.0, 0.0),
            Detection::new(2, 1, 3.0, 0.0, 5.0, 2.0, 0.0),
            Detection::new(3, 2, 4.0, 0.0, 5.0, 2.0, 0.0),
        ];
        let nearest = nearest_per_frame(&detections, &[0, 1, 2, 3], &Point2::origin());
        let rows: Vec<usize> = nearest.iter().map(|&(r, _)| r).collect();
        assert_eq!(rows, vec![0, 1, 3]);
    }

    #[test]
    fn test_two_well_separated_clusters() {
        let ds = two_clusters(4);
        let params = TrackingParams::default();
        let groups = greedy_groups(&ds, &params);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 4));

        let mut rng = StdRng::seed_from_u64(7);
        let (grouped, summary) = group_detections(&ds, &params, &mut rng);
        assert_eq!(summary.tracks, 2);
        assert_eq!(summary.rejected_detections, 0);
        assert_eq!(grouped.unassigned_count(), 0);
        assert_eq!(grouped.track_ids(), vec![0, 1]);

        // Both clusters keep their members together.
        for members in grouped.tracks().values() {
            let xs: Vec<f64> = members.iter().map(|&r| grouped.detections()[r].x()).collect();
            assert!(xs.iter().all(|&x| x < 100.0) || xs.iter().all(|&x| x > 100.0));
        }
    }

    #[test]
    fn test_far_outlier_becomes_singleton_and_rejected() {
        let mut ds = two_clusters(4).into_detections();
        let n = ds.len();
        ds.push(Detection::new(n, 2, 600.0, 600.0, 8.0, 3.0, 0.0));
        // 8 frames: the clusters cover half of them, the stray detection one.
        let ds = TrajectoryDataset::new(ds, 8);

        let mut rng = StdRng::seed_from_u64(1);
        let (grouped, summary) = group_detections(&ds, &TrackingParams::default(), &mut rng);
        assert_eq!(summary.groups, 3);
        assert_eq!(summary.tracks, 2);
        assert_eq!(summary.rejected_detections, 1);
        assert_eq!(grouped.detections()[n].track_id, UNASSIGNED);
    }

    #[test]
    fn test_size_filter_drops_oversized_member() {
        // Frame 3 carries a blob twice the usual length at the same spot.
        let mut detections: Vec<Detection> = (1..=5)
            .map(|f| Detection::new(f as usize, f, 50.0, 50.0 + f as f64 * 0.1, 10.0, 4.0, 0.0))
            .collect();
        detections[2].major = 25.0;
        let ds = TrajectoryDataset::new(detections, 5);

        let groups = greedy_groups(&ds, &TrackingParams::default());
        assert_eq!(groups[0], vec![0, 1, 3, 4]);
        assert_eq!(groups[1], vec![2]);
    }

    #[test]
    fn test_no_group_above_coverage() {
        let ds = two_clusters(4);
        let params = TrackingParams::builder()
            .coverage_fraction(1.0)
            .build()
            .unwrap();
        // Shrink the clusters below full coverage by declaring more frames.
        let ds = TrajectoryDataset::new(ds.into_detections(), 10);
        let mut rng = StdRng::seed_from_u64(3);
        let (grouped, summary) = group_detections(&ds, &params, &mut rng);
        assert_eq!(summary.tracks, 0);
        assert_eq!(grouped.unassigned_count(), grouped.len());
    }

    #[test]
    fn test_permutation_is_seeded() {
        let a = permute_track_ids(10, &mut StdRng::seed_from_u64(11));
        let b = permute_track_ids(10, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }
}
