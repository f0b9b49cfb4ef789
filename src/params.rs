//! # Tracking parameters
//!
//! This module defines the [`TrackingParams`] configuration struct and its builder, which
//! control how detections are **grouped** into tracks, how the **refinement loop** reassigns,
//! prunes and deduplicates them, how the **random-forest scorer** is grown, and how the
//! **rotational-diffusion** noise threshold is simulated.
//!
//! ## Pipeline overview
//!
//! 1. **Greedy grouping**
//!    Nearest-per-frame clustering filtered by `size_quantile` and `size_consistency_factor`;
//!    groups covering fewer than `coverage_fraction × total_frames` frames are rejected.
//!
//! 2. **Refinement**
//!    `refinement_rounds` rounds of score → reassign (`reassign_confidence`) → prune
//!    (`outlier_factor`) → deduplicate (`duplicate_tie_policy`). The scorer is a forest of
//!    `forest_trees` trees.
//!
//! 3. **Diffusion threshold**
//!    `diffusion_trial_count` simulated Brownian paths of `diffusion_window` seconds with
//!    `diffusion_time_step` steps, a log-normal fit resampled `diffusion_resample_count` times,
//!    and the `1 − diffusion_significance_p` quantile.
//!
//! ## Example
//!
//! ```rust
//! use spinfit::params::TrackingParams;
//!
//! let params = TrackingParams::builder()
//!     .coverage_fraction(0.5)
//!     .refinement_rounds(3)
//!     .forest_trees(50)
//!     .diffusion_significance_p(0.05)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.refinement_rounds, 3);
//! ```
use crate::constants::{Second, DEFAULT_PIXEL_TO_METER};
use crate::spinfit_errors::SpinfitError;
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

/// What duplicate resolution does when several detections of one frame share the top
/// score for their track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateTiePolicy {
    /// Only a unique maximum survives; tied members all go to the unassigned bucket.
    #[default]
    DiscardAll,
    /// The tied member with the lowest display index survives.
    KeepFirst,
}

impl fmt::Display for DuplicateTiePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateTiePolicy::DiscardAll => write!(f, "discard-all"),
            DuplicateTiePolicy::KeepFirst => write!(f, "keep-first"),
        }
    }
}

/// Configuration of the whole tracking pipeline.
///
/// Fields
/// -----------------
/// **Grouping**
/// * `coverage_fraction` – minimum fraction of frames a group must cover to become a track.
/// * `size_quantile` – quantile of the Major axis used as the cell-size proxy (proximity radius).
/// * `size_consistency_factor` – second-pass members with `Major > factor × median Major` are dropped.
///
/// **Refinement**
/// * `refinement_rounds` – number of rounds; `0` returns the grouping unchanged.
/// * `reassign_confidence` – a top score above this moves a detection to its top track.
/// * `outlier_factor` – pruning radius as a multiple of the track's `size_quantile` Major axis.
/// * `duplicate_tie_policy` – see [`DuplicateTiePolicy`].
///
/// **Track scorer (random forest)**
/// * `forest_trees` – number of bootstrapped regression trees.
/// * `forest_max_depth` – optional depth cap (`None` grows trees until leaves are pure).
/// * `forest_min_samples_split` – minimum node size eligible for a split.
///
/// **Diffusion model**
/// * `pixel_to_meter` – image scale used to convert ellipse axes to meters.
/// * `diffusion_significance_p` – tail probability of the noise threshold.
/// * `diffusion_trial_count` – number of simulated paths.
/// * `diffusion_resample_count` – size of the log-normal resample.
/// * `diffusion_time_step` – duration of one simulated step (s).
/// * `diffusion_window` – duration of one simulated path (s).
/// * `diffusion_angle_bins` – resolution of the step-angle density over `[0, π]`.
///
/// **Rotation extraction**
/// * `spin_frequency_floor` – frequencies (Hz) above this count toward the motile mean.
///
/// Defaults
/// -----------------
/// * `coverage_fraction`: 0.25, `size_quantile`: 0.9, `size_consistency_factor`: 1.3
/// * `refinement_rounds`: 5, `reassign_confidence`: 0.8, `outlier_factor`: 1.1,
///   `duplicate_tie_policy`: [`DuplicateTiePolicy::DiscardAll`]
/// * `forest_trees`: 100, `forest_max_depth`: `None`, `forest_min_samples_split`: 2
/// * `pixel_to_meter`: 0.185e-6, `diffusion_significance_p`: 0.01,
///   `diffusion_trial_count`: 500, `diffusion_resample_count`: 10 000,
///   `diffusion_time_step`: 1 ms, `diffusion_window`: 1 s, `diffusion_angle_bins`: 1001
/// * `spin_frequency_floor`: 0.1 Hz
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingParams {
    // --- Grouping ---
    pub coverage_fraction: f64,
    pub size_quantile: f64,
    pub size_consistency_factor: f64,

    // --- Refinement ---
    pub refinement_rounds: usize,
    pub reassign_confidence: f64,
    pub outlier_factor: f64,
    pub duplicate_tie_policy: DuplicateTiePolicy,

    // --- Random forest ---
    pub forest_trees: usize,
    pub forest_max_depth: Option<usize>,
    pub forest_min_samples_split: usize,

    // --- Diffusion ---
    pub pixel_to_meter: f64,
    pub diffusion_significance_p: f64,
    pub diffusion_trial_count: usize,
    pub diffusion_resample_count: usize,
    pub diffusion_time_step: Second,
    pub diffusion_window: Second,
    pub diffusion_angle_bins: usize,

    // --- Rotation extraction ---
    pub spin_frequency_floor: f64,
}

impl TrackingParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`TrackingParamsBuilder`] initialized with the defaults.
    pub fn builder() -> TrackingParamsBuilder {
        TrackingParamsBuilder::new()
    }
}

impl Default for TrackingParams {
    fn default() -> Self {
        TrackingParams {
            coverage_fraction: 0.25,
            size_quantile: 0.9,
            size_consistency_factor: 1.3,

            refinement_rounds: 5,
            reassign_confidence: 0.8,
            outlier_factor: 1.1,
            duplicate_tie_policy: DuplicateTiePolicy::DiscardAll,

            forest_trees: 100,
            forest_max_depth: None,
            forest_min_samples_split: 2,

            pixel_to_meter: DEFAULT_PIXEL_TO_METER,
            diffusion_significance_p: 0.01,
            diffusion_trial_count: 500,
            diffusion_resample_count: 10_000,
            diffusion_time_step: 1.0e-3,
            diffusion_window: 1.0,
            diffusion_angle_bins: 1001,

            spin_frequency_floor: 0.1,
        }
    }
}

/// Builder for [`TrackingParams`], with validation.
#[derive(Debug, Clone)]
pub struct TrackingParamsBuilder {
    params: TrackingParams,
}

impl Default for TrackingParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: TrackingParams::default(),
        }
    }

    // --- Grouping ---
    pub fn coverage_fraction(mut self, v: f64) -> Self {
        self.params.coverage_fraction = v;
        self
    }
    pub fn size_quantile(mut self, v: f64) -> Self {
        self.params.size_quantile = v;
        self
    }
    pub fn size_consistency_factor(mut self, v: f64) -> Self {
        self.params.size_consistency_factor = v;
        self
    }

    // --- Refinement ---
    pub fn refinement_rounds(mut self, v: usize) -> Self {
        self.params.refinement_rounds = v;
        self
    }
    pub fn reassign_confidence(mut self, v: f64) -> Self {
        self.params.reassign_confidence = v;
        self
    }
    pub fn outlier_factor(mut self, v: f64) -> Self {
        self.params.outlier_factor = v;
        self
    }
    pub fn duplicate_tie_policy(mut self, v: DuplicateTiePolicy) -> Self {
        self.params.duplicate_tie_policy = v;
        self
    }

    // --- Random forest ---
    pub fn forest_trees(mut self, v: usize) -> Self {
        self.params.forest_trees = v;
        self
    }
    pub fn forest_max_depth(mut self, v: Option<usize>) -> Self {
        self.params.forest_max_depth = v;
        self
    }
    pub fn forest_min_samples_split(mut self, v: usize) -> Self {
        self.params.forest_min_samples_split = v;
        self
    }

    // --- Diffusion ---
    pub fn pixel_to_meter(mut self, v: f64) -> Self {
        self.params.pixel_to_meter = v;
        self
    }
    pub fn diffusion_significance_p(mut self, v: f64) -> Self {
        self.params.diffusion_significance_p = v;
        self
    }
    pub fn diffusion_trial_count(mut self, v: usize) -> Self {
        self.params.diffusion_trial_count = v;
        self
    }
    pub fn diffusion_resample_count(mut self, v: usize) -> Self {
        self.params.diffusion_resample_count = v;
        self
    }
    pub fn diffusion_time_step(mut self, v: Second) -> Self {
        self.params.diffusion_time_step = v;
        self
    }
    pub fn diffusion_window(mut self, v: Second) -> Self {
        self.params.diffusion_window = v;
        self
    }
    pub fn diffusion_angle_bins(mut self, v: usize) -> Self {
        self.params.diffusion_angle_bins = v;
        self
    }

    // --- Rotation extraction ---
    pub fn spin_frequency_floor(mut self, v: f64) -> Self {
        self.params.spin_frequency_floor = v;
        self
    }

    // ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Return true iff x <= 1.0 and comparable.
    #[inline]
    fn le1(x: f64) -> bool {
        matches!(x.partial_cmp(&1.0), Some(Less) | Some(Equal))
    }

    /// Finalize the builder and produce a [`TrackingParams`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * `0 < coverage_fraction ≤ 1`
    /// * `0 ≤ size_quantile ≤ 1`, `size_consistency_factor > 0`
    /// * `0 ≤ reassign_confidence ≤ 1`, `outlier_factor > 0`
    /// * `forest_trees ≥ 1`, `forest_min_samples_split ≥ 2`, `forest_max_depth ≠ Some(0)`
    /// * `pixel_to_meter > 0`
    /// * `0 < diffusion_significance_p < 1`
    /// * `diffusion_trial_count ≥ 2`, `diffusion_resample_count ≥ 1`
    /// * `diffusion_time_step > 0`, `diffusion_window ≥ diffusion_time_step`
    /// * `diffusion_angle_bins ≥ 2`
    /// * `spin_frequency_floor ≥ 0`
    ///
    /// `refinement_rounds = 0` is allowed and disables refinement.
    ///
    /// Returns
    /// -----------------
    /// * `Ok(TrackingParams)` if all values are valid,
    /// * `Err(SpinfitError::InvalidTrackingParameter)` naming the first failing rule.
    pub fn build(self) -> Result<TrackingParams, SpinfitError> {
        let p = &self.params;
        let invalid = |msg: &str| Err(SpinfitError::InvalidTrackingParameter(msg.into()));

        if !(Self::gt0(p.coverage_fraction) && Self::le1(p.coverage_fraction)) {
            return invalid("coverage_fraction must be in (0, 1]");
        }
        if !(Self::ge0(p.size_quantile) && Self::le1(p.size_quantile)) {
            return invalid("size_quantile must be in [0, 1]");
        }
        if !Self::gt0(p.size_consistency_factor) {
            return invalid("size_consistency_factor must be > 0");
        }
        if !(Self::ge0(p.reassign_confidence) && Self::le1(p.reassign_confidence)) {
            return invalid("reassign_confidence must be in [0, 1]");
        }
        if !Self::gt0(p.outlier_factor) {
            return invalid("outlier_factor must be > 0");
        }

        if p.forest_trees == 0 {
            return invalid("forest_trees must be >= 1");
        }
        if p.forest_min_samples_split < 2 {
            return invalid("forest_min_samples_split must be >= 2");
        }
        if p.forest_max_depth == Some(0) {
            return invalid("forest_max_depth must be >= 1 when set");
        }

        if !Self::gt0(p.pixel_to_meter) {
            return invalid("pixel_to_meter must be > 0");
        }
        if !(Self::gt0(p.diffusion_significance_p) && p.diffusion_significance_p < 1.0) {
            return invalid("diffusion_significance_p must be in (0, 1)");
        }
        if p.diffusion_trial_count < 2 {
            return invalid("diffusion_trial_count must be >= 2");
        }
        if p.diffusion_resample_count == 0 {
            return invalid("diffusion_resample_count must be >= 1");
        }
        if !Self::gt0(p.diffusion_time_step) {
            return invalid("diffusion_time_step must be > 0");
        }
        if p.diffusion_window.partial_cmp(&p.diffusion_time_step) == Some(Less)
            || p.diffusion_window.is_nan()
        {
            return invalid("diffusion_window must be >= diffusion_time_step");
        }
        if p.diffusion_angle_bins < 2 {
            return invalid("diffusion_angle_bins must be >= 2");
        }
        if !Self::ge0(p.spin_frequency_floor) {
            return invalid("spin_frequency_floor must be >= 0");
        }

        Ok(self.params)
    }
}

impl fmt::Display for TrackingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 46;
            writeln!(f, "Tracking Parameters")?;
            writeln!(f, "-------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Grouping]")?;
            line!(
                "coverage_fraction        = {:.3}",
                self.coverage_fraction,
                "Minimum fraction of frames per track"
            )?;
            line!(
                "size_quantile            = {:.3}",
                self.size_quantile,
                "Major-axis quantile used as size proxy"
            )?;
            line!(
                "size_consistency_factor  = {:.3}",
                self.size_consistency_factor,
                "Max Major relative to group median"
            )?;

            writeln!(f, "\n[Refinement]")?;
            line!(
                "refinement_rounds        = {}",
                self.refinement_rounds,
                "Score/reassign/prune rounds"
            )?;
            line!(
                "reassign_confidence      = {:.3}",
                self.reassign_confidence,
                "Top score forcing a move"
            )?;
            line!(
                "outlier_factor           = {:.3}",
                self.outlier_factor,
                "Pruning radius multiplier"
            )?;
            line!(
                "duplicate_tie_policy     = {}",
                self.duplicate_tie_policy,
                "Tie handling in duplicate resolution"
            )?;

            writeln!(f, "\n[Random forest]")?;
            line!(
                "forest_trees             = {}",
                self.forest_trees,
                "Bootstrapped regression trees"
            )?;
            line!(
                "forest_max_depth         = {:?}",
                self.forest_max_depth,
                "Depth cap"
            )?;
            line!(
                "forest_min_samples_split = {}",
                self.forest_min_samples_split,
                "Minimum node size to split"
            )?;

            writeln!(f, "\n[Diffusion]")?;
            line!(
                "pixel_to_meter           = {:.3e} m",
                self.pixel_to_meter,
                "Image scale"
            )?;
            line!(
                "diffusion_significance_p = {:.3}",
                self.diffusion_significance_p,
                "Tail probability of the threshold"
            )?;
            line!(
                "diffusion_trial_count    = {}",
                self.diffusion_trial_count,
                "Simulated paths"
            )?;
            line!(
                "diffusion_resample_count = {}",
                self.diffusion_resample_count,
                "Log-normal resample size"
            )?;
            line!(
                "diffusion_time_step      = {:.1e} s",
                self.diffusion_time_step,
                "Simulation step"
            )?;
            line!(
                "diffusion_window         = {:.3} s",
                self.diffusion_window,
                "Path duration"
            )?;
            line!(
                "diffusion_angle_bins     = {}",
                self.diffusion_angle_bins,
                "Step density resolution over [0, π]"
            )?;

            writeln!(f, "\n[Rotation]")?;
            line!(
                "spin_frequency_floor     = {:.3} Hz",
                self.spin_frequency_floor,
                "Motile frequency floor"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "TrackingParams(coverage={:.2}, rounds={}, reassign>{:.2}, outlier×{:.2}, trees={}, p={:.3}, trials={})",
                self.coverage_fraction,
                self.refinement_rounds,
                self.reassign_confidence,
                self.outlier_factor,
                self.forest_trees,
                self.diffusion_significance_p,
                self.diffusion_trial_count,
            )
        }
    }
}
