//! # Sample pipeline
//!
//! [`SpinFit`] wires the stages of the crate together for one sample (one recording):
//!
//! 1. **Grouping** – [`group_detections`] turns the raw detections into initial tracks.
//! 2. **Refinement** – a [`RefinementEngine`] improves the assignment with the track scorer.
//! 3. **Noise threshold** – a [`DiffusionSimulator`] sized from the refined tracks gives the
//!    Brownian excursion to beat.
//! 4. **Spin results** – with frame timestamps, [`spin_results`] keeps the spinning tracks.
//!
//! Every random draw comes from the caller's RNG, in that order, so a seeded
//! [`StdRng`](rand::rngs::StdRng) reproduces a whole analysis.
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use spinfit::{Detection, SpinFit, TrackingParams, TrajectoryDataset};
//!
//! let mut detections = Vec::new();
//! for frame in 1..=8u32 {
//!     let f = frame as f64;
//!     detections.push(Detection::new(detections.len(), frame, 10.0 + 0.2 * f, 10.0, 12.0, 4.0, 20.0 * f));
//!     detections.push(Detection::new(detections.len(), frame, 90.0, 40.0 + 0.2 * f, 11.0, 4.0, 3.0));
//! }
//! let dataset = TrajectoryDataset::from_detections(detections);
//!
//! let params = TrackingParams::builder()
//!     .refinement_rounds(2)
//!     .forest_trees(10)
//!     .diffusion_trial_count(50)
//!     .diffusion_resample_count(1000)
//!     .build()
//!     .unwrap();
//! let report = SpinFit::new(params)
//!     .analyze(&dataset, None, &mut StdRng::seed_from_u64(42))
//!     .unwrap();
//! assert_eq!(report.dataset().number_of_tracks(), 2);
//! ```
use std::fmt;

use log::{info, warn};
use rand::Rng;

use crate::{
    detections::{track_stats::TrackCountStats, TrajectoryDataset},
    diffusion::{DiffusionSimulator, NoiseThreshold},
    grouping::{group_detections, GroupingSummary},
    params::TrackingParams,
    refinement::{RefinementEngine, RefinementOutcome},
    rotation::{spin_results, FrameTimes, SpinResult},
    scorer::{forest::RandomForestScorer, TrackScorer},
    spinfit_errors::SpinfitError,
};

/// Everything produced for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub grouping: GroupingSummary,
    pub refinement: RefinementOutcome,
    /// One-second noise threshold, `None` when the sample has no track.
    pub noise: Option<NoiseThreshold>,
    /// Spinning tracks, empty when no frame timestamps were given.
    pub spins: Vec<SpinResult>,
}

impl SampleReport {
    /// Refined dataset, in display order.
    pub fn dataset(&self) -> &TrajectoryDataset {
        &self.refinement.dataset
    }

    pub fn rms(&self) -> Option<f64> {
        self.refinement.rms
    }

    pub fn track_count_stats(&self) -> Option<TrackCountStats> {
        self.dataset().track_count_stats()
    }
}

impl fmt::Display for SampleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rms = self
            .rms()
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.4}"));
        let noise = self
            .noise
            .map_or_else(|| "n/a".to_string(), |n| format!("{:.4} rad", n.radians));

        if f.alternate() {
            writeln!(f, "Sample report")?;
            writeln!(f, "-------------")?;
            writeln!(f, "detections     : {}", self.dataset().len())?;
            writeln!(f, "groups         : {}", self.grouping.groups)?;
            writeln!(f, "tracks         : {}", self.dataset().number_of_tracks())?;
            writeln!(f, "unassigned     : {}", self.dataset().unassigned_count())?;
            writeln!(f, "rounds         : {}", self.refinement.rounds_completed)?;
            writeln!(f, "rms            : {rms}")?;
            writeln!(f, "noise (1 s)    : {noise}")?;
            write!(f, "spinning       : {}", self.spins.len())
        } else {
            write!(
                f,
                "tracks={}, unassigned={}, rms={}, noise={}, spinning={}",
                self.dataset().number_of_tracks(),
                self.dataset().unassigned_count(),
                rms,
                noise,
                self.spins.len()
            )
        }
    }
}

/// One-sample analysis façade.
#[derive(Debug, Clone)]
pub struct SpinFit<S = RandomForestScorer> {
    engine: RefinementEngine<S>,
}

impl SpinFit<RandomForestScorer> {
    /// Pipeline with the random-forest scorer configured from `params`.
    pub fn new(params: TrackingParams) -> Self {
        SpinFit::with_scorer(RandomForestScorer::from_params(&params), params)
    }
}

impl Default for SpinFit<RandomForestScorer> {
    fn default() -> Self {
        SpinFit::new(TrackingParams::default())
    }
}

impl<S: TrackScorer> SpinFit<S> {
    /// Pipeline refining with a custom `scorer`.
    pub fn with_scorer(scorer: S, params: TrackingParams) -> Self {
        SpinFit {
            engine: RefinementEngine::new(scorer, params),
        }
    }

    pub fn params(&self) -> &TrackingParams {
        self.engine.params()
    }

    /// Initial greedy grouping.
    pub fn group<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> (TrajectoryDataset, GroupingSummary) {
        group_detections(dataset, self.params(), rng)
    }

    /// Refinement of an existing assignment.
    pub fn refine<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> Result<RefinementOutcome, SpinfitError> {
        self.engine.refine(dataset, rng)
    }

    /// One-second Brownian noise threshold for the tracks of `dataset`.
    pub fn noise_threshold<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        rng: &mut R,
    ) -> Result<NoiseThreshold, SpinfitError> {
        DiffusionSimulator::from_dataset(dataset, self.params())?.noise_threshold(rng)
    }

    /// Full analysis of one sample.
    ///
    /// Arguments
    /// -----------------
    /// * `dataset`: raw detections; existing track IDs are ignored.
    /// * `times`: frame timestamps; without them no spin result is computed.
    /// * `rng`: single source of randomness for every stage.
    ///
    /// Return
    /// ----------
    /// * The [`SampleReport`], [`SpinfitError::EmptyDataset`] for an empty input, or the first
    ///   error of the refinement, diffusion or rotation stage.
    pub fn analyze<R: Rng + ?Sized>(
        &self,
        dataset: &TrajectoryDataset,
        times: Option<&FrameTimes>,
        rng: &mut R,
    ) -> Result<SampleReport, SpinfitError> {
        if dataset.is_empty() {
            return Err(SpinfitError::EmptyDataset);
        }

        let (grouped, grouping) = self.group(dataset, rng);
        let refinement = self.refine(&grouped, rng)?;

        if refinement.dataset.number_of_tracks() == 0 {
            warn!("No track left after refinement, skipping the noise threshold");
            return Ok(SampleReport {
                grouping,
                refinement,
                noise: None,
                spins: Vec::new(),
            });
        }

        let noise = self.noise_threshold(&refinement.dataset, rng)?;
        let spins = match times {
            Some(times) => spin_results(&refinement.dataset, times, &noise, self.params())?,
            None => Vec::new(),
        };

        if let Some(stats) = refinement.dataset.track_count_stats() {
            info!("Detections per track: {stats}");
        }

        Ok(SampleReport {
            grouping,
            refinement,
            noise: Some(noise),
            spins,
        })
    }
}
