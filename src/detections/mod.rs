//! # Detections and trajectory datasets
//!
//! The central table of the crate. A [`Detection`] is one segmented cell in one frame; a
//! [`TrajectoryDataset`] is the ordered, mutable table of all detections of a sample together
//! with the number of frames of the source sequence.
//!
//! Data Model
//! -----------------
//! * **Detection:** frame index, position `(X, Y)` in pixels, fitted ellipse (`Major`,
//!   `Minor`, `Angle` in degrees), display index (row of the source table) and the assigned
//!   [`TrackId`].
//! * **Track:** all detections sharing a non-negative track ID. The [`UNASSIGNED`] bucket
//!   (`-1`) is not a track and is skipped by every per-track statistic.
//! * **Dataset:** `Vec<Detection>` + `total_frames`. Track IDs partition the table; only the
//!   `track_id` field is ever mutated after ingestion.
//!
//! Snapshots of a dataset are taken with [`Clone`]; the refinement engine keeps its best
//! configuration as an independent clone of the working table.
//!
//! Modules
//! -----------------
//! * [`csv_io`](crate::detections::csv_io) – tabular hand-off (read/write particle-analysis CSV).
//! * [`track_stats`](crate::detections::track_stats) – per-track detection count statistics.
use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Point2;

use crate::constants::{Degree, FrameIndex, Pixel, TrackId, UNASSIGNED};

pub mod csv_io;
pub mod track_stats;

/// One observed cell in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Row index in the source table, used to restore display order.
    pub index: usize,
    pub frame: FrameIndex,
    pub position: Point2<Pixel>,
    /// Major axis length of the fitted ellipse (pixels).
    pub major: Pixel,
    /// Minor axis length of the fitted ellipse (pixels).
    pub minor: Pixel,
    /// Orientation of the major axis (degrees).
    pub angle: Degree,
    pub track_id: TrackId,
}

impl Detection {
    /// Build an unassigned detection.
    pub fn new(
        index: usize,
        frame: FrameIndex,
        x: Pixel,
        y: Pixel,
        major: Pixel,
        minor: Pixel,
        angle: Degree,
    ) -> Self {
        Detection {
            index,
            frame,
            position: Point2::new(x, y),
            major,
            minor,
            angle,
            track_id: UNASSIGNED,
        }
    }

    /// Same detection with its track ID replaced.
    pub fn with_track(mut self, track_id: TrackId) -> Self {
        self.track_id = track_id;
        self
    }

    #[inline]
    pub fn x(&self) -> Pixel {
        self.position.x
    }

    #[inline]
    pub fn y(&self) -> Pixel {
        self.position.y
    }

    /// `Major / Minor`.
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.major / self.minor
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.track_id != UNASSIGNED
    }

    /// Feature vector fed to the track scorer: `[X, Y, Major, Minor, Angle]`.
    #[inline]
    pub fn features(&self) -> [f64; 5] {
        [
            self.position.x,
            self.position.y,
            self.major,
            self.minor,
            self.angle,
        ]
    }
}

/// Ordered table of detections for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryDataset {
    detections: Vec<Detection>,
    total_frames: FrameIndex,
}

impl TrajectoryDataset {
    /// Wrap detections with an explicit frame count.
    pub fn new(detections: Vec<Detection>, total_frames: FrameIndex) -> Self {
        TrajectoryDataset {
            detections,
            total_frames,
        }
    }

    /// Wrap detections, taking the largest frame index as the frame count.
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let total_frames = detections.iter().map(|d| d.frame).max().unwrap_or(0);
        TrajectoryDataset::new(detections, total_frames)
    }

    #[inline]
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    #[inline]
    pub fn detections_mut(&mut self) -> &mut [Detection] {
        &mut self.detections
    }

    pub fn into_detections(self) -> Vec<Detection> {
        self.detections
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    #[inline]
    pub fn total_frames(&self) -> FrameIndex {
        self.total_frames
    }

    /// Assign `track_id` to the detection at row `row`.
    #[inline]
    pub fn set_track(&mut self, row: usize, track_id: TrackId) {
        self.detections[row].track_id = track_id;
    }

    /// Every distinct label present, the unassigned bucket included, in ascending order.
    pub fn labels(&self) -> Vec<TrackId> {
        self.detections
            .iter()
            .map(|d| d.track_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct real track IDs (unassigned bucket excluded), ascending.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.labels()
            .into_iter()
            .filter(|&id| id != UNASSIGNED)
            .collect()
    }

    /// Number of real tracks.
    pub fn number_of_tracks(&self) -> usize {
        self.track_ids().len()
    }

    /// Row indices of every real track, keyed by track ID.
    pub fn tracks(&self) -> BTreeMap<TrackId, Vec<usize>> {
        let mut tracks: BTreeMap<TrackId, Vec<usize>> = BTreeMap::new();
        for (row, d) in self.detections.iter().enumerate() {
            if d.is_assigned() {
                tracks.entry(d.track_id).or_default().push(row);
            }
        }
        tracks
    }

    /// Row indices of the detections carrying `track_id`.
    pub fn members(&self, track_id: TrackId) -> Vec<usize> {
        self.detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.track_id == track_id)
            .map(|(row, _)| row)
            .collect()
    }

    pub fn unassigned_count(&self) -> usize {
        self.detections.iter().filter(|d| !d.is_assigned()).count()
    }

    /// Restore source-table order (stable sort on the display index).
    pub fn sort_by_display_order(&mut self) {
        self.detections.sort_by_key(|d| d.index);
    }

    /// `(display index, track ID)` pairs in display order.
    ///
    /// Handy to compare two assignments of the same detections regardless of row order.
    pub fn assignments(&self) -> Vec<(usize, TrackId)> {
        let mut pairs: Vec<_> = self
            .detections
            .iter()
            .map(|d| (d.index, d.track_id))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}
