//! # Particle-analysis CSV hand-off
//!
//! Read and write the tabular exchange format shared with the ingestion and plotting layers:
//! one row per detection, as produced by an ImageJ-style "Analyze Particles" export.
//!
//! ## Columns
//! -----------------
//! | header        | meaning                                    | required |
//! |---------------|--------------------------------------------|----------|
//! | `" "`         | row index (display order)                  | no       |
//! | `Slice`       | frame index                                | yes      |
//! | `X`, `Y`      | centroid, pixels                           | yes      |
//! | `Major`       | major axis of the fitted ellipse, pixels   | yes      |
//! | `Minor`       | minor axis of the fitted ellipse, pixels   | yes      |
//! | `Angle`       | ellipse orientation, degrees               | yes      |
//! | `ID`          | track ID (`-1` unassigned)                 | no       |
//! | `AspectRatio` | `Major / Minor`                            | no       |
//!
//! Any other column (Area, Mean, …) is ignored.
//!
//! ## Raw versus processed tables
//! -----------------
//! A table **without** an `ID` column is a raw export: the angle is mirrored
//! (`Angle ← 180 − Angle`, image rows grow downwards) and every detection starts unassigned.
//! A table **with** an `ID` column was written by [`write_detections`] and is read verbatim.
//!
//! The frame count of the returned dataset is the largest `Slice` value.
use std::io;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{FrameIndex, TrackId, UNASSIGNED},
    detections::{Detection, TrajectoryDataset},
    spinfit_errors::SpinfitError,
};

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    #[serde(rename = " ", default)]
    index: Option<usize>,
    #[serde(rename = "Slice")]
    frame: FrameIndex,
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Major")]
    major: f64,
    #[serde(rename = "Minor")]
    minor: f64,
    #[serde(rename = "Angle")]
    angle: f64,
    #[serde(rename = "ID", default)]
    track_id: Option<TrackId>,
}

#[derive(Debug, Serialize)]
struct DetectionRow {
    #[serde(rename = " ")]
    index: usize,
    #[serde(rename = "Slice")]
    frame: FrameIndex,
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Major")]
    major: f64,
    #[serde(rename = "Minor")]
    minor: f64,
    #[serde(rename = "Angle")]
    angle: f64,
    #[serde(rename = "AspectRatio")]
    aspect_ratio: f64,
    #[serde(rename = "ID")]
    track_id: TrackId,
}

impl From<&Detection> for DetectionRow {
    fn from(d: &Detection) -> Self {
        DetectionRow {
            index: d.index,
            frame: d.frame,
            x: d.x(),
            y: d.y(),
            major: d.major,
            minor: d.minor,
            angle: d.angle,
            aspect_ratio: d.aspect_ratio(),
            track_id: d.track_id,
        }
    }
}

/// Parse a particle-analysis table from any reader.
///
/// Arguments
/// -----------------
/// * `reader`: CSV source with a header row.
///
/// Return
/// ----------
/// * The dataset in file order, or
/// * [`SpinfitError::CsvError`] on malformed rows / missing required columns,
/// * [`SpinfitError::EmptyDataset`] if the table has no rows.
pub fn read_detections<R: io::Read>(reader: R) -> Result<TrajectoryDataset, SpinfitError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let processed = rdr.headers()?.iter().any(|h| h == "ID");

    let mut detections = Vec::new();
    for (row, record) in rdr.deserialize::<DetectionRecord>().enumerate() {
        let rec = record?;
        let angle = if processed { rec.angle } else { 180.0 - rec.angle };
        let detection = Detection::new(
            rec.index.unwrap_or(row + 1),
            rec.frame,
            rec.x,
            rec.y,
            rec.major,
            rec.minor,
            angle,
        )
        .with_track(rec.track_id.unwrap_or(UNASSIGNED));
        detections.push(detection);
    }

    if detections.is_empty() {
        return Err(SpinfitError::EmptyDataset);
    }
    Ok(TrajectoryDataset::from_detections(detections))
}

/// Parse a particle-analysis table from disk.
///
/// See [`read_detections`] for the format rules.
pub fn read_detections_csv(path: &Utf8Path) -> Result<TrajectoryDataset, SpinfitError> {
    let file = std::fs::File::open(path)?;
    read_detections(io::BufReader::new(file))
}

/// Write a dataset (with its track IDs) in display order.
pub fn write_detections<W: io::Write>(
    dataset: &TrajectoryDataset,
    writer: W,
) -> Result<(), SpinfitError> {
    let mut sorted: Vec<&Detection> = dataset.detections().iter().collect();
    sorted.sort_by_key(|d| d.index);

    let mut wtr = csv::Writer::from_writer(writer);
    for d in sorted {
        wtr.serialize(DetectionRow::from(d))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a dataset to disk, see [`write_detections`].
pub fn write_detections_csv(
    dataset: &TrajectoryDataset,
    path: &Utf8Path,
) -> Result<(), SpinfitError> {
    let file = std::fs::File::create(path)?;
    write_detections(dataset, io::BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RAW: &str = " ,Area,X,Y,Major,Minor,Angle,Slice
1,40,10.5,20.0,12.0,4.0,30.0,1
2,41,11.0,20.5,12.5,4.2,150.0,2
3,39,80.0,90.0,11.0,4.0,0.0,2
";

    #[test]
    fn test_read_raw_table_mirrors_angles() {
        let ds = read_detections(RAW.as_bytes()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.total_frames(), 2);

        let first = &ds.detections()[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.frame, 1);
        assert_relative_eq!(first.angle, 150.0);
        assert_relative_eq!(first.aspect_ratio(), 3.0);
        assert_eq!(first.track_id, UNASSIGNED);
        assert_relative_eq!(ds.detections()[2].angle, 180.0);
    }

    #[test]
    fn test_write_then_read_keeps_ids_and_angles() {
        let mut ds = read_detections(RAW.as_bytes()).unwrap();
        ds.set_track(0, 4);
        ds.set_track(1, 4);

        let mut buffer = Vec::new();
        write_detections(&ds, &mut buffer).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with(" ,Slice,X,Y,Major,Minor,Angle,AspectRatio,ID"));

        let back = read_detections(buffer.as_slice()).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_missing_index_column_uses_row_number() {
        let table = "X,Y,Major,Minor,Angle,Slice\n1,1,5,2,10,3\n";
        let ds = read_detections(table.as_bytes()).unwrap();
        assert_eq!(ds.detections()[0].index, 1);
        assert_eq!(ds.total_frames(), 3);
    }

    #[test]
    fn test_empty_and_malformed_tables() {
        let empty = "X,Y,Major,Minor,Angle,Slice\n";
        assert_eq!(
            read_detections(empty.as_bytes()).unwrap_err(),
            SpinfitError::EmptyDataset
        );

        let missing_column = "X,Y,Major,Minor,Slice\n1,1,5,2,3\n";
        assert!(matches!(
            read_detections(missing_column.as_bytes()),
            Err(SpinfitError::CsvError(_))
        ));
    }
}
