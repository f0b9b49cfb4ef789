//! # Rotation and spin frequency of refined tracks
//!
//! Turns the per-frame orientation of every track into a rotation signal, keeps the tracks
//! whose total angular excursion beats the Brownian noise threshold and summarizes their
//! spin frequency.
//!
//! ## Rotation signal
//! -----------------
//! For a track ordered by frame, with orientations `a_i` in degrees:
//!
//! 1. `r_i = a_i − a_(i−1)`, wrapped into `(−90, 90]` (an ellipse orientation is only defined
//!    modulo 180°): `−180` when above 90, then `+180` when at or below −90.
//! 2. A centred 5-point moving average replaces `r_i` wherever its whole window
//!    `r_(i−2) … r_(i+2)` exists; the ends keep their raw value.
//! 3. Cumulative rotation `c_0 = 0`, `c_i = c_(i−1) + r_i`.
//! 4. Frequency `f_i = |r_i| / (t_i − t_(i−1)) / 360` in revolutions per second; undefined for
//!    the first detection.
//!
//! A track is **spinning** when `max c − min c` reaches the noise threshold for the duration of
//! the recording (see [`NoiseThreshold::degrees_for`]).
use std::collections::BTreeMap;

use log::debug;

use crate::{
    constants::{Degree, FrameIndex, Meter, Second, TrackId},
    detections::TrajectoryDataset,
    diffusion::NoiseThreshold,
    geometry::{mean, quantile},
    params::TrackingParams,
    spinfit_errors::SpinfitError,
};

/// Timestamp (seconds) of every frame of a recording.
///
/// Frame timing comes from image metadata and is supplied by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameTimes {
    times: BTreeMap<FrameIndex, Second>,
}

impl FrameTimes {
    pub fn new(times: BTreeMap<FrameIndex, Second>) -> Self {
        FrameTimes { times }
    }

    /// Frames `1..=total_frames` at a constant `fps`, frame 1 at `t = 0`.
    pub fn from_frame_rate(total_frames: FrameIndex, fps: f64) -> Self {
        FrameTimes::new(
            (1..=total_frames)
                .map(|frame| (frame, (frame - 1) as f64 / fps))
                .collect(),
        )
    }

    /// Time of `frame`, [`SpinfitError::MissingFrameTime`] if unknown.
    pub fn get(&self, frame: FrameIndex) -> Result<Second, SpinfitError> {
        self.times
            .get(&frame)
            .copied()
            .ok_or(SpinfitError::MissingFrameTime(frame))
    }

    /// Latest timestamp of the recording, 0 when empty.
    pub fn duration(&self) -> Second {
        self.times.values().copied().fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

impl FromIterator<(FrameIndex, Second)> for FrameTimes {
    fn from_iter<I: IntoIterator<Item = (FrameIndex, Second)>>(iter: I) -> Self {
        FrameTimes::new(iter.into_iter().collect())
    }
}

/// Rotation signal of one track, ordered by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRotation {
    pub track_id: TrackId,
    pub rows: Vec<usize>,
    pub times: Vec<Second>,
    /// Smoothed signed rotation per step (degrees), `None` for the first detection.
    pub rotation: Vec<Option<Degree>>,
    pub cumulative: Vec<Degree>,
    /// Revolutions per second, `None` for the first detection.
    pub frequency: Vec<Option<f64>>,
}

impl TrackRotation {
    /// Peak-to-trough cumulative rotation (degrees).
    pub fn excursion(&self) -> Degree {
        let hi = self.cumulative.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lo = self.cumulative.iter().copied().fold(f64::INFINITY, f64::min);
        if hi.is_finite() && lo.is_finite() {
            hi - lo
        } else {
            0.0
        }
    }
}

fn wrap_half_turn(mut d: Degree) -> Degree {
    if d > 90.0 {
        d -= 180.0;
    }
    if d <= -90.0 {
        d += 180.0;
    }
    d
}

/// Rotation signal of `track_id`.
///
/// Return
/// ----------
/// * The [`TrackRotation`], or [`SpinfitError::MissingFrameTime`] for the first frame of the
///   track without a timestamp.
pub fn extract_rotation(
    dataset: &TrajectoryDataset,
    track_id: TrackId,
    times: &FrameTimes,
) -> Result<TrackRotation, SpinfitError> {
    let detections = dataset.detections();
    let mut rows = dataset.members(track_id);
    rows.sort_by_key(|&r| (detections[r].frame, detections[r].index));

    let stamps = rows
        .iter()
        .map(|&r| times.get(detections[r].frame))
        .collect::<Result<Vec<_>, _>>()?;

    let n = rows.len();
    let raw: Vec<Degree> = (1..n)
        .map(|i| wrap_half_turn(detections[rows[i]].angle - detections[rows[i - 1]].angle))
        .collect();

    // raw[k] is the step into row k + 1
    let mut rotation: Vec<Option<Degree>> = std::iter::once(None)
        .chain(raw.iter().copied().map(Some))
        .collect();
    for i in 3..n.saturating_sub(2) {
        rotation[i] = mean(&raw[i - 3..=i + 1]);
    }

    let cumulative: Vec<Degree> = rotation
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r.unwrap_or(0.0);
            Some(*acc)
        })
        .collect();

    let frequency: Vec<Option<f64>> = (0..n)
        .map(|i| {
            let r = rotation[i]?;
            let dt = stamps[i] - stamps[i - 1];
            (dt > 0.0).then(|| r.abs() / dt / 360.0)
        })
        .collect();

    Ok(TrackRotation {
        track_id,
        rows,
        times: stamps,
        rotation,
        cumulative,
        frequency,
    })
}

/// Summary of one spinning track.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinResult {
    pub track_id: TrackId,
    pub times: Vec<Second>,
    pub cumulative_rotation: Vec<Degree>,
    /// Defined frequencies (Hz), in frame order.
    pub frequencies: Vec<f64>,
    /// Mean of the frequencies above `spin_frequency_floor`, `None` if there are none.
    pub mean_frequency: Option<f64>,
    /// `size_quantile` Major axis of the track (meters).
    pub size: Meter,
    pub detections_observed: usize,
    pub total_frames: FrameIndex,
}

/// Spin summaries of every track of `dataset` rotating beyond Brownian noise.
///
/// Arguments
/// -----------------
/// * `dataset`: refined tracks.
/// * `times`: timestamp of every frame used by a track.
/// * `noise`: one-second noise threshold, scaled to `times.duration()`.
/// * `params`: `spin_frequency_floor`, `size_quantile` and `pixel_to_meter`.
///
/// A recording lasting zero seconds (a single frame at `t = 0`) scales the threshold to zero,
/// so every track passes the gate.
pub fn spin_results(
    dataset: &TrajectoryDataset,
    times: &FrameTimes,
    noise: &NoiseThreshold,
    params: &TrackingParams,
) -> Result<Vec<SpinResult>, SpinfitError> {
    let threshold = noise.degrees_for(times.duration());
    if threshold <= 0.0 {
        debug!(
            "Recording lasts {:.3} s: noise threshold scales to {:.3}°, every track counts as spinning",
            times.duration(),
            threshold
        );
    }
    let detections = dataset.detections();
    let mut results = Vec::new();

    for track_id in dataset.track_ids() {
        let track = extract_rotation(dataset, track_id, times)?;
        if track.excursion() < threshold {
            debug!(
                "Track {}: excursion {:.1}° below noise {:.1}°",
                track_id,
                track.excursion(),
                threshold
            );
            continue;
        }

        let frequencies: Vec<f64> = track.frequency.iter().flatten().copied().collect();
        let motile: Vec<f64> = frequencies
            .iter()
            .copied()
            .filter(|&f| f > params.spin_frequency_floor)
            .collect();
        let majors: Vec<f64> = track.rows.iter().map(|&r| detections[r].major).collect();

        results.push(SpinResult {
            track_id,
            mean_frequency: mean(&motile),
            size: quantile(&majors, params.size_quantile).unwrap_or(0.0) * params.pixel_to_meter,
            detections_observed: track.rows.len(),
            total_frames: dataset.total_frames(),
            times: track.times,
            cumulative_rotation: track.cumulative,
            frequencies,
        });
    }

    Ok(results)
}
