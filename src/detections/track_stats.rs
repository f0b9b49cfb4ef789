//! # Track length statistics
//!
//! Quick distribution summary of **detections per track** for logging and reporting, e.g.
//! after grouping or refinement. The unassigned bucket is not a track and is ignored.
use std::fmt;

use crate::detections::TrajectoryDataset;

/// Summary statistics for per-track detection counts.
///
/// Fields
/// -----------------
/// * `tracks` – number of real tracks.
/// * `min` – smallest track.
/// * `p25` – 25th percentile of track sizes.
/// * `median` – 50th percentile.
/// * `p95` – 95th percentile, the upper tail.
/// * `max` – largest track.
/// * `unassigned` – detections in the `-1` bucket.
///
/// Percentiles use the *nearest-rank* method: index `round(q × (N-1))`, clamped.
///
/// Display
/// -----------------
/// * `format!("{}", stats)` – compact single line:
///   ```text
///   tracks=3, min=12, p25=12, median=18, p95=20, max=20, unassigned=7
///   ```
/// * `format!("{:#}", stats)` – aligned multi-line table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackCountStats {
    pub tracks: usize,
    pub min: usize,
    pub p25: usize,
    pub median: usize,
    pub p95: usize,
    pub max: usize,
    pub unassigned: usize,
}

impl fmt::Display for TrackCountStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Detections per track — summary")?;
            writeln!(f, "------------------------------")?;
            writeln!(f, "tracks     : {}", self.tracks)?;
            writeln!(f, "min        : {}", self.min)?;
            writeln!(f, "p25        : {}", self.p25)?;
            writeln!(f, "median     : {}", self.median)?;
            writeln!(f, "p95        : {}", self.p95)?;
            writeln!(f, "max        : {}", self.max)?;
            write!(f, "unassigned : {}", self.unassigned)
        } else {
            write!(
                f,
                "tracks={}, min={}, p25={}, median={}, p95={}, max={}, unassigned={}",
                self.tracks, self.min, self.p25, self.median, self.p95, self.max, self.unassigned
            )
        }
    }
}

impl TrajectoryDataset {
    /// Distribution of detections per real track.
    ///
    /// Return
    /// ----------
    /// * `None` if the dataset has no real track.
    /// * `Some(TrackCountStats)` otherwise.
    pub fn track_count_stats(&self) -> Option<TrackCountStats> {
        let mut counts: Vec<usize> = self.tracks().values().map(Vec::len).collect();
        if counts.is_empty() {
            return None;
        }
        counts.sort_unstable();

        #[inline]
        fn q_index(n: usize, q: f64) -> usize {
            let idx = (q * (n as f64 - 1.0)).round() as isize;
            idx.clamp(0, (n as isize) - 1) as usize
        }

        let n = counts.len();
        Some(TrackCountStats {
            tracks: n,
            min: counts[0],
            p25: counts[q_index(n, 0.25)],
            median: counts[q_index(n, 0.50)],
            p95: counts[q_index(n, 0.95)],
            max: counts[n - 1],
            unassigned: self.unassigned_count(),
        })
    }
}
