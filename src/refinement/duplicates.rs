//! Same-frame duplicate resolution.
//!
//! A track holds at most one detection per frame. When a `(frame, track)` pair has several
//! members, only the member with the strictly highest score for that track survives; the
//! others go to the unassigned bucket. Members tied at the maximum are handled by the
//! [`DuplicateTiePolicy`].
use itertools::Itertools;
use log::debug;
use smallvec::SmallVec;

use crate::{
    constants::UNASSIGNED,
    detections::TrajectoryDataset,
    params::DuplicateTiePolicy,
    scorer::ScoreTable,
};

/// Resolve same-frame duplicates of every real track using this round's `scores`.
///
/// A track missing from `scores` scores 0 for every row, so all its duplicates tie.
///
/// Return
/// ----------
/// * The number of detections unassigned.
pub fn remove_duplicates(
    dataset: &mut TrajectoryDataset,
    scores: &ScoreTable,
    policy: DuplicateTiePolicy,
) -> usize {
    let groups = dataset
        .detections()
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_assigned())
        .map(|(row, d)| ((d.frame, d.track_id), row))
        .into_group_map();

    let mut dropped = Vec::new();
    for ((frame, track_id), rows) in groups.into_iter().sorted_by_key(|(key, _)| *key) {
        if rows.len() < 2 {
            continue;
        }

        let score_of = |row: usize| scores.get(track_id, row).unwrap_or(0.0);
        let best = rows
            .iter()
            .map(|&row| score_of(row))
            .fold(f64::NEG_INFINITY, f64::max);
        let tied: SmallVec<[usize; 4]> =
            rows.iter().copied().filter(|&row| score_of(row) == best).collect();

        let keep = match (tied.len(), policy) {
            (1, _) => Some(tied[0]),
            (_, DuplicateTiePolicy::KeepFirst) => tied
                .iter()
                .copied()
                .min_by_key(|&row| dataset.detections()[row].index),
            (_, DuplicateTiePolicy::DiscardAll) => None,
        };

        debug!(
            "Duplicates: track {} has {} members in frame {}, {} tied at {:.3}",
            track_id,
            rows.len(),
            frame,
            tied.len(),
            best
        );
        dropped.extend(rows.into_iter().filter(|&row| Some(row) != keep));
    }

    for &row in &dropped {
        dataset.set_track(row, UNASSIGNED);
    }
    dropped.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::Detection;

    fn frame_pair() -> TrajectoryDataset {
        TrajectoryDataset::from_detections(vec![
            Detection::new(0, 1, 0.0, 0.0, 5.0, 2.0, 0.0).with_track(2),
            Detection::new(1, 2, 1.0, 0.0, 5.0, 2.0, 0.0).with_track(2),
            Detection::new(2, 2, 1.5, 0.0, 5.0, 2.0, 0.0).with_track(2),
            Detection::new(3, 2, 9.0, 9.0, 5.0, 2.0, 0.0),
        ])
    }

    fn scores(frame2: [f64; 2]) -> ScoreTable {
        let mut t = ScoreTable::new(4);
        t.insert(UNASSIGNED, vec![0.0, 1.0 - frame2[0], 1.0 - frame2[1], 1.0])
            .unwrap();
        t.insert(2, vec![1.0, frame2[0], frame2[1], 0.0]).unwrap();
        t
    }

    #[test]
    fn test_highest_score_survives() {
        let mut ds = frame_pair();
        let dropped = remove_duplicates(&mut ds, &scores([0.6, 0.9]), DuplicateTiePolicy::DiscardAll);
        assert_eq!(dropped, 1);
        assert_eq!(ds.members(2), vec![0, 2]);
    }

    #[test]
    fn test_exact_tie_discards_both() {
        let mut ds = frame_pair();
        let dropped =
            remove_duplicates(&mut ds, &scores([0.95, 0.95]), DuplicateTiePolicy::DiscardAll);
        assert_eq!(dropped, 2);
        assert_eq!(ds.members(2), vec![0]);
        assert_eq!(ds.detections()[1].track_id, UNASSIGNED);
        assert_eq!(ds.detections()[2].track_id, UNASSIGNED);
    }

    #[test]
    fn test_exact_tie_keep_first() {
        let mut ds = frame_pair();
        let dropped =
            remove_duplicates(&mut ds, &scores([0.95, 0.95]), DuplicateTiePolicy::KeepFirst);
        assert_eq!(dropped, 1);
        assert_eq!(ds.members(2), vec![0, 1]);
    }

    #[test]
    fn test_no_duplicates_left() {
        let mut ds = frame_pair();
        remove_duplicates(&mut ds, &scores([0.3, 0.2]), DuplicateTiePolicy::DiscardAll);
        let frames: Vec<u32> = ds
            .members(2)
            .iter()
            .map(|&r| ds.detections()[r].frame)
            .collect();
        assert!(frames.iter().all_unique());
    }
}
