//! # Rotational-diffusion noise threshold
//!
//! A free-floating rod-shaped cell rotates randomly under thermal agitation. Before calling a
//! track "spinning", its angular excursion has to be compared with what Brownian rotation alone
//! would produce over the same observation time. This module estimates that excursion by
//! Monte-Carlo simulation.
//!
//! ## Model
//! -----------------
//! * Cell geometry: width `W` and length `L` (meters), the median over tracks of the per-track
//!   median Minor and Major axes, scaled by `pixel_to_meter`.
//! * Rotational diffusion coefficient of a slender rod:
//!
//! ```text
//! D_r = 3 k_B T ln(L / W) / (π η L³)
//! ```
//!
//! * Angular step density over one time step `dt` (small-time limit):
//!
//! ```text
//! p(θ) = (4π D_r dt)^(-1/2) · exp(−θ² / (4 D_r dt)),   θ ∈ [0, π]
//! ```
//!
//!   tabulated on `diffusion_angle_bins` evenly spaced angles, normalized and cumulated.
//!
//! ## Simulation
//! -----------------
//! 1. A step draws `r ~ U[0, 1)`, takes the first tabulated angle whose CDF is `≥ r` and a
//!    fair-coin sign.
//! 2. A path accumulates `diffusion_window / dt` steps from 0 and records its peak-to-trough
//!    excursion `max − min` (the starting 0 included).
//! 3. `diffusion_trial_count` paths are log-transformed; their mean and population standard
//!    deviation define a log-normal law, resampled `diffusion_resample_count` times.
//! 4. The `1 − p` quantile of the resample is the one-second threshold (radians).
//!
//! Thresholds for other durations are scaled by `π^(log10(duration))`, see
//! [`NoiseThreshold::scaled_for`].
use std::f64::consts::PI;

use log::{debug, info};
use rand::Rng;
use rand_distr::{Distribution, LogNormal};

use crate::{
    constants::{
        Meter, Radian, Second, BOLTZMANN, MEDIUM_TEMPERATURE, MEDIUM_VISCOSITY, RADEG,
    },
    detections::TrajectoryDataset,
    geometry::{mean, median, population_std, quantile},
    params::TrackingParams,
    spinfit_errors::SpinfitError,
};

/// Rotational diffusion coefficient (1/s) of a rod of `width × length` meters in water at
/// 20 °C.
pub fn rotational_diffusion_coefficient(width: Meter, length: Meter) -> f64 {
    3.0 * BOLTZMANN * MEDIUM_TEMPERATURE * (length / width).ln()
        / (PI * MEDIUM_VISCOSITY * length.powi(3))
}

/// Median per-track cell width and length in meters.
///
/// Return
/// ----------
/// * `(width, length)`, or [`SpinfitError::DegenerateGeometry`] when the dataset has no track.
pub fn cell_dimensions(
    dataset: &TrajectoryDataset,
    pixel_to_meter: f64,
) -> Result<(Meter, Meter), SpinfitError> {
    let detections = dataset.detections();
    let (minors, majors): (Vec<f64>, Vec<f64>) = dataset
        .tracks()
        .values()
        .filter_map(|rows| {
            let minor: Vec<f64> = rows.iter().map(|&r| detections[r].minor).collect();
            let major: Vec<f64> = rows.iter().map(|&r| detections[r].major).collect();
            Some((median(&minor)?, median(&major)?))
        })
        .unzip();

    match (median(&minors), median(&majors)) {
        (Some(w), Some(l)) => Ok((w * pixel_to_meter, l * pixel_to_meter)),
        _ => Err(SpinfitError::DegenerateGeometry(
            "no track to measure the cell size from".into(),
        )),
    }
}

/// Noise threshold for a one-second observation, with the fit it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseThreshold {
    /// `1 − p` quantile of the resampled excursions (radians).
    pub radians: Radian,
    /// Mean of the log excursions.
    pub log_mean: f64,
    /// Population standard deviation of the log excursions.
    pub log_std: f64,
    /// Rotational diffusion coefficient used (1/s).
    pub rotational_diffusion: f64,
}

impl NoiseThreshold {
    /// Threshold (radians) for an observation lasting `duration` seconds.
    pub fn scaled_for(&self, duration: Second) -> Radian {
        self.radians * PI.powf(duration.log10())
    }

    /// Same as [`scaled_for`](Self::scaled_for), in degrees.
    pub fn degrees_for(&self, duration: Second) -> f64 {
        self.scaled_for(duration) / RADEG
    }
}

/// Brownian rotation sampler for one cell geometry.
#[derive(Debug, Clone)]
pub struct DiffusionSimulator {
    width: Meter,
    length: Meter,
    rotational_diffusion: f64,
    angles: Vec<Radian>,
    cdf: Vec<f64>,
    steps_per_trial: usize,
    trials: usize,
    resamples: usize,
    significance_p: f64,
}

impl DiffusionSimulator {
    /// Simulator for a cell of `width × length` meters.
    ///
    /// Arguments
    /// -----------------
    /// * `width`, `length`: cell dimensions, finite, positive, `length > width`.
    /// * `params`: the `diffusion_*` fields drive the simulation.
    ///
    /// Return
    /// ----------
    /// * [`SpinfitError::DegenerateGeometry`] when the dimensions or the resulting step density
    ///   are unusable.
    pub fn new(
        width: Meter,
        length: Meter,
        params: &TrackingParams,
    ) -> Result<Self, SpinfitError> {
        if !(width.is_finite() && length.is_finite()) || width <= 0.0 || length <= 0.0 {
            return Err(SpinfitError::DegenerateGeometry(format!(
                "cell dimensions must be finite and positive, got width={width:e} m, length={length:e} m"
            )));
        }
        if length <= width {
            return Err(SpinfitError::DegenerateGeometry(format!(
                "cell length {length:e} m must exceed its width {width:e} m"
            )));
        }

        let dt = params.diffusion_time_step;
        let dr = rotational_diffusion_coefficient(width, length);
        let bins = params.diffusion_angle_bins;
        let angles: Vec<Radian> = (0..bins)
            .map(|i| PI * i as f64 / (bins - 1) as f64)
            .collect();

        let spread = 4.0 * dr * dt;
        let density: Vec<f64> = angles
            .iter()
            .map(|&a| (PI * spread).sqrt().recip() * (-(a * a) / spread).exp())
            .collect();
        let total: f64 = density.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(SpinfitError::DegenerateGeometry(format!(
                "step density cannot be normalized (D_r = {dr:e} 1/s)"
            )));
        }

        let cdf: Vec<f64> = density
            .iter()
            .scan(0.0, |acc, p| {
                *acc += p / total;
                Some(*acc)
            })
            .collect();

        let steps_per_trial = (params.diffusion_window / dt).round().max(1.0) as usize;
        debug!(
            "Diffusion: W={:.3e} m, L={:.3e} m, D_r={:.4e} 1/s, {} steps per path",
            width, length, dr, steps_per_trial
        );

        Ok(DiffusionSimulator {
            width,
            length,
            rotational_diffusion: dr,
            angles,
            cdf,
            steps_per_trial,
            trials: params.diffusion_trial_count,
            resamples: params.diffusion_resample_count,
            significance_p: params.diffusion_significance_p,
        })
    }

    /// Simulator sized from the tracks of `dataset`.
    pub fn from_dataset(
        dataset: &TrajectoryDataset,
        params: &TrackingParams,
    ) -> Result<Self, SpinfitError> {
        let (width, length) = cell_dimensions(dataset, params.pixel_to_meter)?;
        DiffusionSimulator::new(width, length, params)
    }

    pub fn width(&self) -> Meter {
        self.width
    }

    pub fn length(&self) -> Meter {
        self.length
    }

    pub fn rotational_diffusion(&self) -> f64 {
        self.rotational_diffusion
    }

    /// One signed angular step (radians).
    pub fn sample_step<R: Rng + ?Sized>(&self, rng: &mut R) -> Radian {
        let r: f64 = rng.random();
        let bin = self
            .cdf
            .partition_point(|&c| c < r)
            .min(self.angles.len() - 1);
        let magnitude = self.angles[bin];
        if rng.random_bool(0.5) {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Peak-to-trough excursion of one simulated path (radians).
    pub fn excursion<R: Rng + ?Sized>(&self, rng: &mut R) -> Radian {
        let (mut angle, mut lo, mut hi) = (0.0f64, 0.0f64, 0.0f64);
        for _ in 0..self.steps_per_trial {
            angle += self.sample_step(rng);
            lo = lo.min(angle);
            hi = hi.max(angle);
        }
        hi - lo
    }

    /// Run the Monte-Carlo trials and reduce them to a one-second [`NoiseThreshold`].
    pub fn noise_threshold<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<NoiseThreshold, SpinfitError> {
        let excursions: Vec<f64> = (0..self.trials).map(|_| self.excursion(rng)).collect();
        if excursions.iter().any(|&e| e <= 0.0) {
            return Err(SpinfitError::DegenerateGeometry(format!(
                "diffusion too slow to resolve with {} angle bins (D_r = {:e} 1/s)",
                self.angles.len(),
                self.rotational_diffusion
            )));
        }

        let logs: Vec<f64> = excursions.iter().map(|e| e.ln()).collect();
        let (Some(log_mean), Some(log_std)) = (mean(&logs), population_std(&logs)) else {
            return Err(SpinfitError::DegenerateGeometry(
                "no diffusion trial to fit".into(),
            ));
        };

        let law = LogNormal::new(log_mean, log_std)?;
        let resampled: Vec<f64> = (0..self.resamples).map(|_| law.sample(rng)).collect();
        let radians = quantile(&resampled, 1.0 - self.significance_p).ok_or_else(|| {
            SpinfitError::DegenerateGeometry("empty log-normal resample".into())
        })?;

        info!(
            "Diffusion threshold: {:.4} rad per second (p = {}, {} trials)",
            radians, self.significance_p, self.trials
        );

        Ok(NoiseThreshold {
            radians,
            log_mean,
            log_std,
            rotational_diffusion: self.rotational_diffusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::Detection;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    const W: Meter = 0.8e-6;
    const L: Meter = 2.5e-6;

    fn quick_params(p: f64) -> TrackingParams {
        TrackingParams::builder()
            .diffusion_significance_p(p)
            .diffusion_trial_count(60)
            .diffusion_resample_count(2000)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rotational_diffusion_coefficient() {
        let expected = 3.0 * 1.38e-23 * 293.0 * (L / W).ln() / (PI * 1e-3 * L.powi(3));
        assert_relative_eq!(rotational_diffusion_coefficient(W, L), expected, max_relative = 1e-12);
        assert!(rotational_diffusion_coefficient(W, L) > 0.0);
    }

    #[test]
    fn test_cdf_is_normalized() {
        let sim = DiffusionSimulator::new(W, L, &TrackingParams::default()).unwrap();
        assert_eq!(sim.cdf.len(), 1001);
        assert_relative_eq!(*sim.cdf.last().unwrap(), 1.0, epsilon = 1e-9);
        assert!(sim.cdf.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(sim.angles[1000], PI);
    }

    #[test]
    fn test_steps_are_tabulated_angles() {
        let sim = DiffusionSimulator::new(W, L, &TrackingParams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let step = sim.sample_step(&mut rng).abs();
            assert!(sim.angles.iter().any(|&a| a == step));
        }
    }

    #[test]
    fn test_degenerate_geometry() {
        let params = TrackingParams::default();
        for (w, l) in [(0.0, L), (W, f64::NAN), (L, W), (W, W), (-W, L)] {
            assert!(matches!(
                DiffusionSimulator::new(w, l, &params),
                Err(SpinfitError::DegenerateGeometry(_))
            ));
        }
        let empty = TrajectoryDataset::from_detections(vec![Detection::new(
            0, 1, 0.0, 0.0, 10.0, 3.0, 0.0,
        )]);
        assert!(matches!(
            DiffusionSimulator::from_dataset(&empty, &params),
            Err(SpinfitError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_cell_dimensions_use_track_medians() {
        let ds = TrajectoryDataset::from_detections(vec![
            Detection::new(0, 1, 0.0, 0.0, 10.0, 3.0, 0.0).with_track(0),
            Detection::new(1, 2, 0.0, 0.0, 12.0, 5.0, 0.0).with_track(0),
            Detection::new(2, 1, 9.0, 0.0, 20.0, 4.0, 0.0).with_track(1),
            Detection::new(3, 1, 99.0, 0.0, 90.0, 90.0, 0.0),
        ]);
        let (w, l) = cell_dimensions(&ds, 1.0).unwrap();
        // track medians: (4, 11) and (4, 20)
        assert_relative_eq!(w, 4.0);
        assert_relative_eq!(l, 15.5);
    }

    #[test]
    fn test_threshold_decreases_with_p() {
        let strict = DiffusionSimulator::new(W, L, &quick_params(0.01))
            .unwrap()
            .noise_threshold(&mut StdRng::seed_from_u64(99))
            .unwrap();
        let loose = DiffusionSimulator::new(W, L, &quick_params(0.2))
            .unwrap()
            .noise_threshold(&mut StdRng::seed_from_u64(99))
            .unwrap();
        assert_eq!(strict.log_mean, loose.log_mean);
        assert!(strict.radians >= loose.radians);
        assert!(loose.radians > 0.0);
    }

    #[test]
    fn test_duration_scaling() {
        let t = NoiseThreshold {
            radians: 1.5,
            log_mean: 0.0,
            log_std: 0.1,
            rotational_diffusion: 0.5,
        };
        assert_relative_eq!(t.scaled_for(1.0), 1.5);
        assert_relative_eq!(t.scaled_for(10.0), 1.5 * PI, max_relative = 1e-12);
        assert_relative_eq!(t.degrees_for(1.0), 1.5 * 180.0 / PI, max_relative = 1e-12);
    }
}
