//! Outlier pruning of refined tracks.
//!
//! One pass over a track: take the centroid of its members, keep the members closest to it
//! (every member attaining the minimum distance), average those into a refined centroid and
//! drop every member farther from the refined centroid than
//! `outlier_factor × quantile(Major, size_quantile)` of the track.
//!
//! The refined centroid sits on a member, so dropping a far member can move it onto another
//! member and leave a previously accepted one outside the radius. [`remove_distant`] therefore
//! repeats the pass on each track until it drops nothing, and a second call on its output
//! always unassigns zero detections.
use log::debug;

use crate::{
    constants::UNASSIGNED,
    detections::{Detection, TrajectoryDataset},
    geometry::{centroid, distance, quantile},
    params::TrackingParams,
};

/// One pruning pass over `members`, returns the rows beyond the radius.
fn distant_members(
    detections: &[Detection],
    members: &[usize],
    params: &TrackingParams,
) -> Vec<usize> {
    let Some(center) = centroid(members.iter().map(|&row| &detections[row].position)) else {
        return Vec::new();
    };

    let dists: Vec<f64> = members
        .iter()
        .map(|&row| distance(&center, &detections[row].position))
        .collect();
    let closest = dists.iter().copied().fold(f64::INFINITY, f64::min);

    let Some(refined) = centroid(
        members
            .iter()
            .zip(&dists)
            .filter(|&(_, &d)| d == closest)
            .map(|(&row, _)| &detections[row].position),
    ) else {
        return Vec::new();
    };

    let majors: Vec<f64> = members.iter().map(|&row| detections[row].major).collect();
    let Some(size) = quantile(&majors, params.size_quantile) else {
        return Vec::new();
    };
    let radius = params.outlier_factor * size;

    members
        .iter()
        .copied()
        .filter(|&row| distance(&refined, &detections[row].position) > radius)
        .collect()
}

/// Send far-off members of every track to the unassigned bucket.
///
/// Each track is pruned pass after pass until its member set is stable.
///
/// Return
/// ----------
/// * The number of detections unassigned.
pub fn remove_distant(dataset: &mut TrajectoryDataset, params: &TrackingParams) -> usize {
    let mut pruned = Vec::new();

    for (track_id, mut members) in dataset.tracks() {
        let initial = members.len();
        let mut passes = 0;
        loop {
            let far = distant_members(dataset.detections(), &members, params);
            if far.is_empty() {
                break;
            }
            passes += 1;
            members.retain(|row| !far.contains(row));
            pruned.extend(far);
        }
        if members.len() < initial {
            debug!(
                "Pruning: track {} loses {} of {} members in {} passes",
                track_id,
                initial - members.len(),
                initial,
                passes
            );
        }
    }

    for &row in &pruned {
        dataset.set_track(row, UNASSIGNED);
    }
    pruned.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::Detection;

    /// A tight ten-member track on a small circle plus one member five radii away.
    fn track_with_outlier() -> TrajectoryDataset {
        let mut detections: Vec<Detection> = (0..10)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / 10.0;
                Detection::new(i, i as u32 + 1, 100.0 + t.cos(), 100.0 + t.sin(), 6.0, 2.0, 0.0)
                    .with_track(0)
            })
            .collect();
        detections[0].position.x = 100.0;
        detections[0].position.y = 100.0;
        detections.push(Detection::new(10, 11, 130.0, 100.0, 6.0, 2.0, 0.0).with_track(0));
        TrajectoryDataset::from_detections(detections)
    }

    #[test]
    fn test_single_outlier_is_pruned() {
        let mut ds = track_with_outlier();
        let pruned = remove_distant(&mut ds, &TrackingParams::default());
        assert_eq!(pruned, 1);
        assert_eq!(ds.detections()[10].track_id, UNASSIGNED);
        assert_eq!(ds.members(0).len(), 10);
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let mut ds = track_with_outlier();
        let params = TrackingParams::default();
        remove_distant(&mut ds, &params);
        let once = ds.clone();
        assert_eq!(remove_distant(&mut ds, &params), 0);
        assert_eq!(ds, once);
    }

    /// Offsets along x of a track whose refined centroid jumps once the far member is gone.
    fn track_with_shifting_center() -> TrajectoryDataset {
        let offsets = [-10.0, 0.0, 10.0, 10.2, 10.4, 10.6, 10.8, -42.0];
        TrajectoryDataset::from_detections(
            offsets
                .iter()
                .enumerate()
                .map(|(i, dx)| {
                    Detection::new(i, i as u32 + 1, 200.0 + dx, 50.0, 10.0, 4.0, 0.0).with_track(3)
                })
                .collect(),
        )
    }

    #[test]
    fn test_pruning_repeats_until_stable() {
        // radius 11 px; the first pass drops -42, which moves the refined centroid from 0 to
        // 10 and leaves -10 outside; the third pass keeps everything
        let mut ds = track_with_shifting_center();
        let params = TrackingParams::default();
        assert_eq!(remove_distant(&mut ds, &params), 2);
        assert_eq!(ds.members(3), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(ds.members(UNASSIGNED), vec![0, 7]);

        let once = ds.clone();
        assert_eq!(remove_distant(&mut ds, &params), 0);
        assert_eq!(ds, once);
    }

    #[test]
    fn test_unassigned_bucket_is_ignored() {
        let mut ds = TrajectoryDataset::from_detections(vec![
            Detection::new(0, 1, 0.0, 0.0, 5.0, 2.0, 0.0),
            Detection::new(1, 2, 500.0, 0.0, 5.0, 2.0, 0.0),
        ]);
        assert_eq!(remove_distant(&mut ds, &TrackingParams::default()), 0);
    }
}
