use thiserror::Error;

use crate::constants::{FrameIndex, TrackId};

#[derive(Error, Debug)]
pub enum SpinfitError {
    #[error("Invalid tracking parameter: {0}")]
    InvalidTrackingParameter(String),

    #[error("Degenerate cell geometry for the diffusion model: {0}")]
    DegenerateGeometry(String),

    #[error("Track scorer needs at least two distinct track labels, found {0}")]
    InsufficientTrackDiversity(usize),

    #[error("Log-normal fit of the diffusion trials failed: {0:?}")]
    DiffusionSampling(rand_distr::NormalError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("No timestamp known for frame {0}")]
    MissingFrameTime(FrameIndex),

    #[error("Score column of track {track_id} has {found} rows, the table has {expected}")]
    ScoreColumnLength {
        track_id: TrackId,
        expected: usize,
        found: usize,
    },

    #[error("Dataset contains no detections")]
    EmptyDataset,
}

impl From<rand_distr::NormalError> for SpinfitError {
    fn from(err: rand_distr::NormalError) -> Self {
        SpinfitError::DiffusionSampling(err)
    }
}

impl PartialEq for SpinfitError {
    fn eq(&self, other: &Self) -> bool {
        use SpinfitError::*;
        match (self, other) {
            (InvalidTrackingParameter(a), InvalidTrackingParameter(b)) => a == b,
            (DegenerateGeometry(a), DegenerateGeometry(b)) => a == b,
            (InsufficientTrackDiversity(a), InsufficientTrackDiversity(b)) => a == b,
            (DiffusionSampling(a), DiffusionSampling(b)) => a == b,
            (MissingFrameTime(a), MissingFrameTime(b)) => a == b,
            (
                ScoreColumnLength {
                    track_id: a,
                    expected: ea,
                    found: fa,
                },
                ScoreColumnLength {
                    track_id: b,
                    expected: eb,
                    found: fb,
                },
            ) => a == b && ea == eb && fa == fb,

            // not comparable: same variant means equal
            (CsvError(_), CsvError(_)) => true,
            (IoError(_), IoError(_)) => true,

            (EmptyDataset, EmptyDataset) => true,

            _ => false,
        }
    }
}
