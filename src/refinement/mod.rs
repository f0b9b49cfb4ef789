//! # Iterative track refinement
//!
//! Improves the greedy grouping with a supervised [`TrackScorer`] trained in-sample on the
//! current assignment.
//!
//! ## Round
//! -----------------
//! 1. Train the scorer on the working dataset and score every detection.
//! 2. Evaluate the assignment with [`rms_quality`]; keep an independent snapshot of the working
//!    dataset when it beats the best seen so far (the first evaluation always does).
//! 3. [`reassign`] every detection from its top-two scores.
//! 4. [`pruning::remove_distant`] sends far-off members to the unassigned bucket.
//! 5. [`duplicates::remove_duplicates`] resolves same-frame duplicates with this round's scores.
//!
//! After the last round one more train/score/evaluate step runs, and the best snapshot is
//! returned in display order. The returned RMS therefore never exceeds the initial RMS.
//!
//! ## Stopping early
//! -----------------
//! * `refinement_rounds = 0` returns the input untouched and never calls the scorer.
//! * A scorer failing with [`SpinfitError::InsufficientTrackDiversity`] stops the loop; the
//!   condition is flagged on the [`RefinementOutcome`] and the best snapshot so far (or the
//!   input) is returned. Any other scorer error is propagated.
//!
//! See also
//! ------------
//! * [`crate::grouping::group_detections`] – Produces the initial assignment.
//! * [`crate::scorer::forest::RandomForestScorer`] – Default scorer.
use log::{debug, info, warn};
use rand::Rng;

use crate::{
    constants::UNASSIGNED,
    detections::TrajectoryDataset,
    params::TrackingParams,
    scorer::{ScoreTable, TrackScorer},
    spinfit_errors::SpinfitError,
};

#[cfg(feature = "progress")]
use crate::progress_bar::{fmt_dur, stage_bar, RoundTimer};

pub mod duplicates;
pub mod pruning;

/// Quality of an assignment against in-sample scores, lower is better.
///
/// For every real track column, `sqrt(mean((1 − score)²))` over the detections currently
/// assigned to that track; the result is the mean over columns. Columns without any assigned
/// detection are skipped. `None` when no column contributes.
pub fn rms_quality(dataset: &TrajectoryDataset, scores: &ScoreTable) -> Option<f64> {
    let per_track: Vec<f64> = scores
        .track_ids()
        .filter(|&id| id != UNASSIGNED)
        .filter_map(|id| {
            let column = scores.column(id)?;
            let (sum, n) = dataset
                .detections()
                .iter()
                .zip(column)
                .filter(|(d, _)| d.track_id == id)
                .fold((0.0, 0usize), |(sum, n), (_, &s)| (sum + (1.0 - s).powi(2), n + 1));
            (n > 0).then(|| (sum / n as f64).sqrt())
        })
        .collect();

    if per_track.is_empty() {
        None
    } else {
        Some(per_track.iter().sum::<f64>() / per_track.len() as f64)
    }
}

/// Move every detection according to its two best-scoring tracks.
///
/// A detection goes to its top track when that track differs from its current one or when the
/// top score exceeds `confidence`; otherwise it goes to its runner-up. Rows without a
/// runner-up keep their top track.
///
/// Return
/// ----------
/// * The number of detections whose track changed.
pub fn reassign(dataset: &mut TrajectoryDataset, scores: &ScoreTable, confidence: f64) -> usize {
    let mut moved = 0;
    for row in 0..dataset.len() {
        let Some(((first, first_score), second)) = scores.top_two(row) else {
            continue;
        };
        let current = dataset.detections()[row].track_id;

        let target = if first != current || first_score > confidence {
            first
        } else {
            second.map_or(first, |(id, _)| id)
        };

        if target != current {
            dataset.set_track(row, target);
            moved += 1;
        }
    }
    moved
}

/// Result of a refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    /// Best assignment seen, in display order (the input itself when nothing was evaluated).
    pub dataset: TrajectoryDataset,
    /// RMS of `dataset`, `None` when it was never evaluated or has no scored track.
    pub rms: Option<f64>,
    /// RMS of the input assignment.
    pub initial_rms: Option<f64>,
    /// Full rounds (score, reassign, prune, dedupe) executed.
    pub rounds_completed: usize,
    /// Evaluation index that produced `dataset` (0 = input, `rounds` = final evaluation).
    pub best_round: Option<usize>,
    /// Set when the scorer found fewer than two labels and the loop stopped.
    pub insufficient_diversity: bool,
    /// RMS of every evaluation, in order.
    pub rms_history: Vec<Option<f64>>,
}

impl RefinementOutcome {
    fn unchanged(dataset: &TrajectoryDataset) -> Self {
        RefinementOutcome {
            dataset: dataset.clone(),
            rms: None,
            initial_rms: None,
            rounds_completed: 0,
            best_round: None,
            insufficient_diversity: false,
            rms_history: Vec::new(),
        }
    }
}

struct Snapshot {
    dataset: TrajectoryDataset,
    rms: Option<f64>,
    round: usize,
}

impl Snapshot {
    fn is_beaten_by(&self, rms: Option<f64>) -> bool {
        match (rms, self.rms) {
            (Some(new), Some(best)) => new < best,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Refinement loop around a [`TrackScorer`].
#[derive(Debug, Clone)]
pub struct RefinementEngine<S> {
    scorer: S,
    params: TrackingParams,
}

impl<S: TrackScorer> RefinementEngine<S> {
    pub fn new(scorer: S, params: TrackingParams) -> Self {
        RefinementEngine { scorer, params }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    /// Run `refinement_rounds` rounds on a copy of `dataset`.
    ///
    /// Arguments
    /// -----------------
    /// * `dataset`: initial assignment, typically the grouper output.
    /// * `rng`: randomness handed to the scorer.
    ///
    /// Return
    /// ----------
    /// * The [`RefinementOutcome`], or the first scorer error other than
    ///   [`SpinfitError::InsufficientTrackDiversity`].
    pub fn refine<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> Result<RefinementOutcome, SpinfitError> {
        let rounds = self.params.refinement_rounds;
        if rounds == 0 {
            debug!("Refinement disabled, keeping the initial assignment");
            return Ok(RefinementOutcome::unchanged(dataset));
        }

        let mut working = dataset.clone();
        let mut best: Option<Snapshot> = None;
        let mut history = Vec::with_capacity(rounds + 1);
        let mut rounds_completed = 0;
        let mut insufficient_diversity = false;

        #[cfg(feature = "progress")]
        let pb = stage_bar(rounds as u64 + 1, "refining");
        #[cfg(feature = "progress")]
        let mut timer = RoundTimer::new(0.3);

        for round in 0..=rounds {
            let scores = match self.scorer.score(&working, rng) {
                Ok(scores) => scores,
                Err(SpinfitError::InsufficientTrackDiversity(labels)) => {
                    warn!(
                        "Refinement stopped at evaluation {}: only {} distinct label(s) left",
                        round, labels
                    );
                    insufficient_diversity = true;
                    break;
                }
                Err(err) => return Err(err),
            };

            let rms = rms_quality(&working, &scores);
            history.push(rms);
            if best.as_ref().map_or(true, |b| b.is_beaten_by(rms)) {
                best = Some(Snapshot {
                    dataset: working.clone(),
                    rms,
                    round,
                });
            }

            #[cfg(feature = "progress")]
            {
                let dt = timer.lap();
                pb.set_message(format!(
                    "rms {:.4} | last {} | avg {}",
                    rms.unwrap_or(f64::NAN),
                    fmt_dur(dt),
                    fmt_dur(timer.average())
                ));
                pb.inc(1);
            }

            if round == rounds {
                break;
            }

            let moved = reassign(&mut working, &scores, self.params.reassign_confidence);
            let pruned = pruning::remove_distant(&mut working, &self.params);
            let duplicates = duplicates::remove_duplicates(
                &mut working,
                &scores,
                self.params.duplicate_tie_policy,
            );
            rounds_completed += 1;

            debug!(
                "Round {}: rms {:?}, {} moved, {} pruned, {} duplicates unassigned",
                round + 1,
                rms,
                moved,
                pruned,
                duplicates
            );
        }

        #[cfg(feature = "progress")]
        pb.finish_and_clear();

        let initial_rms = history.first().copied().flatten();
        let outcome = match best {
            Some(mut snapshot) => {
                snapshot.dataset.sort_by_display_order();
                info!(
                    "Refinement: best rms {:?} at evaluation {} (initial {:?}), {} tracks",
                    snapshot.rms,
                    snapshot.round,
                    initial_rms,
                    snapshot.dataset.number_of_tracks()
                );
                RefinementOutcome {
                    dataset: snapshot.dataset,
                    rms: snapshot.rms,
                    initial_rms,
                    rounds_completed,
                    best_round: Some(snapshot.round),
                    insufficient_diversity,
                    rms_history: history,
                }
            }
            None => RefinementOutcome {
                insufficient_diversity,
                ..RefinementOutcome::unchanged(dataset)
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detections::Detection,
        scorer::{forest::RandomForestScorer, TrackModel},
    };
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    struct PanickingScorer;
    struct NeverModel;

    impl TrackModel for NeverModel {
        fn predict(&self, _: &TrajectoryDataset) -> ScoreTable {
            unreachable!()
        }
    }

    impl TrackScorer for PanickingScorer {
        type Model = NeverModel;
        fn train<R: Rng + ?Sized>(
            &self,
            _: &TrajectoryDataset,
            _: &mut R,
        ) -> Result<NeverModel, SpinfitError> {
            panic!("scorer must not be called")
        }
    }

    fn small() -> TrajectoryDataset {
        TrajectoryDataset::from_detections(vec![
            Detection::new(0, 1, 0.0, 0.0, 5.0, 2.0, 0.0).with_track(0),
            Detection::new(1, 2, 0.5, 0.0, 5.0, 2.0, 0.0).with_track(0),
            Detection::new(2, 1, 50.0, 0.0, 5.0, 2.0, 0.0).with_track(1),
            Detection::new(3, 2, 50.5, 0.0, 5.0, 2.0, 0.0),
        ])
    }

    fn table(columns: &[(i32, [f64; 4])]) -> ScoreTable {
        let mut t = ScoreTable::new(4);
        for (id, col) in columns {
            t.insert(*id, col.to_vec()).unwrap();
        }
        t
    }

    #[test]
    fn test_rms_quality() {
        let scores = table(&[
            (-1, [0.0, 0.0, 0.0, 1.0]),
            (0, [1.0, 0.8, 0.0, 0.0]),
            (1, [0.0, 0.2, 0.6, 0.0]),
        ]);
        // track 0: sqrt((0 + 0.04) / 2), track 1: sqrt(0.16)
        let expected = ((0.02f64).sqrt() + 0.4) / 2.0;
        assert_relative_eq!(rms_quality(&small(), &scores).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_rms_quality_skips_empty_columns() {
        let scores = table(&[(-1, [0.5; 4]), (7, [0.5; 4])]);
        assert_eq!(rms_quality(&small(), &scores), None);
    }

    #[test]
    fn test_reassign_rule() {
        let mut ds = small();
        let scores = table(&[
            // row 0: confident in its own track, stays
            // row 1: top is its own track but unsure, goes to runner-up 1
            // row 2: top is another track, moves to 0
            // row 3: unassigned, top is -1 but unsure, goes to runner-up 1
            (-1, [0.05, 0.0, 0.0, 0.6]),
            (0, [0.9, 0.7, 0.6, 0.0]),
            (1, [0.05, 0.3, 0.4, 0.4]),
        ]);
        let moved = reassign(&mut ds, &scores, 0.8);
        assert_eq!(moved, 3);
        let ids: Vec<i32> = ds.detections().iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_zero_rounds_never_scores() {
        let params = TrackingParams::builder().refinement_rounds(0).build().unwrap();
        let engine = RefinementEngine::new(PanickingScorer, params);
        let ds = small();
        let outcome = engine.refine(&ds, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(outcome.dataset, ds);
        assert_eq!(outcome.rounds_completed, 0);
        assert!(outcome.rms_history.is_empty());
    }

    #[test]
    fn test_single_label_is_flagged() {
        let ds = TrajectoryDataset::from_detections(vec![
            Detection::new(0, 1, 0.0, 0.0, 5.0, 2.0, 0.0),
            Detection::new(1, 2, 0.5, 0.0, 5.0, 2.0, 0.0),
        ]);
        let engine = RefinementEngine::new(RandomForestScorer::new(5), TrackingParams::default());
        let outcome = engine.refine(&ds, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(outcome.insufficient_diversity);
        assert_eq!(outcome.dataset, ds);
        assert_eq!(outcome.best_round, None);
    }

    #[test]
    fn test_best_rms_never_exceeds_initial() {
        let mut detections = Vec::new();
        for frame in 1..=12u32 {
            let f = frame as f64;
            detections.push(
                Detection::new(detections.len(), frame, 20.0 + 0.3 * f, 20.0, 9.0, 3.0, 10.0 * f)
                    .with_track(0),
            );
            detections.push(
                Detection::new(detections.len(), frame, 80.0, 70.0 + 0.2 * f, 8.0, 3.0, 4.0 * f)
                    .with_track(1),
            );
        }
        // one mislabelled detection
        detections[4].track_id = 1;
        let ds = TrajectoryDataset::from_detections(detections);

        let params = TrackingParams::builder().forest_trees(15).build().unwrap();
        let engine = RefinementEngine::new(RandomForestScorer::from_params(&params), params);
        let outcome = engine.refine(&ds, &mut StdRng::seed_from_u64(17)).unwrap();

        assert_eq!(outcome.rms_history.len(), 6);
        assert_eq!(outcome.rounds_completed, 5);
        let best = outcome.rms.unwrap();
        assert!(best <= outcome.initial_rms.unwrap());
        assert!(outcome.rms_history.iter().flatten().all(|&r| best <= r));

        let order: Vec<usize> = outcome.dataset.detections().iter().map(|d| d.index).collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
}
