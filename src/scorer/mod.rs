//! # Track scoring
//!
//! A track scorer is a supervised model trained **in-sample** on the current track assignment
//! and asked, for every detection, how strongly it belongs to each known track. The refinement
//! engine uses these soft self-consistency scores to move detections between tracks.
//!
//! Components
//! -----------------
//! * [`ScoreTable`] – one score vector per track ID (the unassigned bucket included), indexed
//!   by dataset row. The column set follows whatever labels the model was trained on, so tracks
//!   may appear or vanish between rounds without any fixed-width layout.
//! * [`TrackScorer`] / [`TrackModel`] – train/predict seam. The crate ships
//!   [`forest::RandomForestScorer`]; tests and callers can plug their own model.
//! * [`forest`] – multi-output random-forest regressor over `[X, Y, Major, Minor, Angle]`.
//! * `regression_tree` – the CART trees the forest is made of (crate-private).
use std::collections::BTreeMap;

use rand::Rng;

use crate::{constants::TrackId, detections::TrajectoryDataset, spinfit_errors::SpinfitError};

pub mod forest;
mod regression_tree;

/// Number of scalar features per detection: `[X, Y, Major, Minor, Angle]`.
pub const N_FEATURES: usize = 5;

/// Per-detection, per-track membership scores in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreTable {
    rows: usize,
    columns: BTreeMap<TrackId, Vec<f64>>,
}

impl ScoreTable {
    /// Empty table for a dataset of `rows` detections.
    pub fn new(rows: usize) -> Self {
        ScoreTable {
            rows,
            columns: BTreeMap::new(),
        }
    }

    /// Add (or replace) the score column of `track_id`.
    ///
    /// Return
    /// ----------
    /// * [`SpinfitError::ScoreColumnLength`] if `scores.len()` differs from the table's row
    ///   count, the table is left unchanged.
    pub fn insert(&mut self, track_id: TrackId, scores: Vec<f64>) -> Result<(), SpinfitError> {
        if scores.len() != self.rows {
            return Err(SpinfitError::ScoreColumnLength {
                track_id,
                expected: self.rows,
                found: scores.len(),
            });
        }
        self.columns.insert(track_id, scores);
        Ok(())
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Track IDs with a column, ascending (the unassigned bucket first when present).
    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.columns.keys().copied()
    }

    pub fn column(&self, track_id: TrackId) -> Option<&[f64]> {
        self.columns.get(&track_id).map(Vec::as_slice)
    }

    /// Score of row `row` for `track_id`.
    #[inline]
    pub fn get(&self, track_id: TrackId, row: usize) -> Option<f64> {
        self.columns.get(&track_id).and_then(|c| c.get(row)).copied()
    }

    /// Highest and second-highest scoring tracks of `row`.
    ///
    /// Ties are broken toward the lower track ID. Returns `None` for an empty table; the
    /// second entry is `None` when the table has a single column.
    pub fn top_two(&self, row: usize) -> Option<((TrackId, f64), Option<(TrackId, f64)>)> {
        let mut first: Option<(TrackId, f64)> = None;
        let mut second: Option<(TrackId, f64)> = None;
        for (&id, column) in &self.columns {
            let s = column[row];
            match first {
                Some((_, fs)) if s <= fs => {
                    if second.map_or(true, |(_, ss)| ss < s) {
                        second = Some((id, s));
                    }
                }
                _ => {
                    second = first;
                    first = Some((id, s));
                }
            }
        }
        first.map(|f| (f, second))
    }
}

/// A model trained on one track assignment.
pub trait TrackModel {
    /// Score every detection of `dataset` against every trained track.
    fn predict(&self, dataset: &TrajectoryDataset) -> ScoreTable;
}

/// Factory of [`TrackModel`]s, trained on the current track labels.
pub trait TrackScorer {
    type Model: TrackModel;

    /// Fit a model whose targets are the one-hot track IDs of `dataset`.
    ///
    /// Implementations must fail with [`SpinfitError::InsufficientTrackDiversity`] when the
    /// dataset carries fewer than two distinct labels.
    fn train<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> Result<Self::Model, SpinfitError>;

    /// Train on `dataset` and score it in-sample.
    fn score<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> Result<ScoreTable, SpinfitError> {
        Ok(self.train(dataset, rng)?.predict(dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ScoreTable {
        let mut t = ScoreTable::new(3);
        t.insert(-1, vec![0.1, 0.5, 0.0]).unwrap();
        t.insert(0, vec![0.7, 0.5, 0.3]).unwrap();
        t.insert(4, vec![0.2, 0.0, 0.7]).unwrap();
        t
    }

    #[test]
    fn test_top_two() {
        let t = table();
        assert_eq!(t.top_two(0), Some(((0, 0.7), Some((4, 0.2)))));
        // tie between -1 and 0: lower ID ranks first
        assert_eq!(t.top_two(1), Some(((-1, 0.5), Some((0, 0.5)))));
        assert_eq!(t.top_two(2), Some(((4, 0.7), Some((0, 0.3)))));
        assert_eq!(ScoreTable::new(1).top_two(0), None);
    }

    #[test]
    fn test_accessors() {
        let t = table();
        assert_eq!(t.track_ids().collect::<Vec<_>>(), vec![-1, 0, 4]);
        assert_eq!(t.get(4, 2), Some(0.7));
        assert_eq!(t.get(5, 0), None);
        assert_eq!(t.column(0), Some(&[0.7, 0.5, 0.3][..]));
    }

    #[test]
    fn test_insert_wrong_length() {
        let mut t = ScoreTable::new(2);
        t.insert(0, vec![0.4, 0.6]).unwrap();
        assert_eq!(
            t.insert(1, vec![1.0]),
            Err(SpinfitError::ScoreColumnLength {
                track_id: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(t.track_ids().collect::<Vec<_>>(), vec![0]);
    }
}
