pub mod constants;
pub mod detections;
pub mod diffusion;
pub mod geometry;
pub mod grouping;
pub mod params;
pub mod pipeline;
pub mod refinement;
pub mod rotation;
pub mod scorer;
pub mod spinfit_errors;

#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

pub use detections::{Detection, TrajectoryDataset};
pub use params::{DuplicateTiePolicy, TrackingParams};
pub use pipeline::{SampleReport, SpinFit};
pub use spinfit_errors::SpinfitError;
