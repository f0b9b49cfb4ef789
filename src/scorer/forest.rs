//! # Random-forest track scorer
//!
//! Multi-output random-forest regression of the one-hot track label on the detection features
//! `[X, Y, Major, Minor, Angle]`.
//!
//! ## Model
//! -----------------
//! * `forest_trees` CART trees, each grown on a bootstrap draw (`n` rows with replacement) of
//!   the dataset, every feature considered at every split.
//! * Split criterion: total squared error summed over all outputs.
//! * Prediction: average over trees of the leaf class proportions, so every score lies in
//!   `[0, 1]` and the scores of one detection sum to 1.
//!
//! Training and prediction happen on the same dataset; the scores are a self-consistency signal
//! for the refinement engine, not a generalizing classifier.
//!
//! The set of output columns is the set of labels present at training time (unassigned bucket
//! included) and can change from one round to the next.
use log::debug;
use rand::Rng;

use crate::{
    constants::TrackId,
    detections::TrajectoryDataset,
    params::TrackingParams,
    scorer::{
        regression_tree::{RegressionTree, TreeLimits},
        ScoreTable, TrackModel, TrackScorer, N_FEATURES,
    },
    spinfit_errors::SpinfitError,
};

/// Random-forest [`TrackScorer`].
#[derive(Debug, Clone, Copy)]
pub struct RandomForestScorer {
    trees: usize,
    limits: TreeLimits,
}

impl RandomForestScorer {
    /// Forest with `trees` fully grown trees.
    pub fn new(trees: usize) -> Self {
        RandomForestScorer {
            trees: trees.max(1),
            limits: TreeLimits {
                max_depth: None,
                min_samples_split: 2,
            },
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.limits.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.limits.min_samples_split = min_samples_split.max(2);
        self
    }

    /// Scorer configured from the `forest_*` fields of `params`.
    pub fn from_params(params: &TrackingParams) -> Self {
        RandomForestScorer::new(params.forest_trees)
            .with_max_depth(params.forest_max_depth)
            .with_min_samples_split(params.forest_min_samples_split)
    }
}

impl Default for RandomForestScorer {
    fn default() -> Self {
        RandomForestScorer::from_params(&TrackingParams::default())
    }
}

/// A trained forest: one output per label seen during training.
#[derive(Debug, Clone)]
pub struct TrackForest {
    labels: Vec<TrackId>,
    trees: Vec<RegressionTree>,
}

impl TrackForest {
    /// Labels of the output columns, ascending.
    pub fn labels(&self) -> &[TrackId] {
        &self.labels
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

fn feature_rows(dataset: &TrajectoryDataset) -> Vec<[f64; N_FEATURES]> {
    dataset.detections().iter().map(|d| d.features()).collect()
}

impl TrackScorer for RandomForestScorer {
    type Model = TrackForest;

    fn train<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> Result<TrackForest, SpinfitError> {
        let labels = dataset.labels();
        if labels.len() < 2 {
            return Err(SpinfitError::InsufficientTrackDiversity(labels.len()));
        }

        let features = feature_rows(dataset);
        let classes: Vec<usize> = dataset
            .detections()
            .iter()
            .map(|d| labels.binary_search(&d.track_id).unwrap_or_default())
            .collect();

        let n = features.len();
        let trees = (0..self.trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                RegressionTree::fit(&features, &classes, labels.len(), bootstrap, self.limits)
            })
            .collect::<Vec<_>>();

        debug!(
            "Forest: {} trees on {} detections, {} labels",
            trees.len(),
            n,
            labels.len()
        );

        Ok(TrackForest { labels, trees })
    }
}

impl TrackModel for TrackForest {
    fn predict(&self, dataset: &TrajectoryDataset) -> ScoreTable {
        let n = dataset.len();
        let k = self.labels.len();
        let mut sums = vec![vec![0.0; n]; k];

        for (row, d) in dataset.detections().iter().enumerate() {
            let x = d.features();
            for tree in &self.trees {
                for (col, p) in tree.predict(&x).iter().enumerate() {
                    sums[col][row] += p;
                }
            }
        }

        let scale = 1.0 / self.trees.len() as f64;
        let mut table = ScoreTable::new(n);
        for (&label, mut column) in self.labels.iter().zip(sums) {
            column.iter_mut().for_each(|s| *s *= scale);
            table.columns.insert(label, column);
        }
        table
    }
}
