#![allow(dead_code)]

use rand::{rngs::StdRng, Rng, SeedableRng};
use spinfit::{Detection, TrajectoryDataset};

/// One synthetic cell: where it sits, how big it is and how fast it turns.
#[derive(Debug, Clone, Copy)]
pub struct CellSpec {
    pub x: f64,
    pub y: f64,
    pub major: f64,
    pub minor: f64,
    /// Orientation change per frame (degrees).
    pub spin: f64,
}

/// Builder of frame-ordered detection tables, the way particle analysis emits them.
pub struct SampleBuilder {
    frames: u32,
    cells: Vec<CellSpec>,
    strays: usize,
    jitter: f64,
    seed: u64,
}

impl SampleBuilder {
    pub fn new(frames: u32) -> Self {
        SampleBuilder {
            frames,
            cells: Vec::new(),
            strays: 0,
            jitter: 0.3,
            seed: 0,
        }
    }

    pub fn cell(mut self, x: f64, y: f64, spin: f64) -> Self {
        self.cells.push(CellSpec {
            x,
            y,
            major: 10.0,
            minor: 4.0,
            spin,
        });
        self
    }

    /// `n` cells on a grid with 80 px spacing; every other cell spins.
    pub fn grid(mut self, n: usize) -> Self {
        for i in 0..n {
            let (col, row) = ((i % 5) as f64, (i / 5) as f64);
            let spin = if i % 2 == 0 { 40.0 } else { 0.0 };
            self = self.cell(40.0 + 80.0 * col, 40.0 + 80.0 * row, spin);
        }
        self
    }

    /// Isolated one-frame detections far from every cell.
    pub fn strays(mut self, n: usize) -> Self {
        self.strays = n;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> TrajectoryDataset {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut detections = Vec::new();

        for frame in 1..=self.frames {
            for cell in &self.cells {
                let f = frame as f64;
                let angle = (90.0 + cell.spin * f + rng.random_range(-0.5..0.5)).rem_euclid(180.0);
                detections.push(Detection::new(
                    detections.len(),
                    frame,
                    cell.x + 0.1 * f + rng.random_range(-self.jitter..=self.jitter),
                    cell.y + rng.random_range(-self.jitter..=self.jitter),
                    cell.major + rng.random_range(-0.3..0.3),
                    cell.minor + rng.random_range(-0.2..0.2),
                    angle,
                ));
            }
        }

        for k in 0..self.strays {
            let frame = 1 + (k as u32 % self.frames.max(1));
            detections.push(Detection::new(
                detections.len(),
                frame,
                2000.0 + 150.0 * k as f64,
                2000.0,
                9.0,
                4.0,
                rng.random_range(0.0..180.0),
            ));
        }

        TrajectoryDataset::new(detections, self.frames)
    }
}

/// Every detection of `original` appears exactly once in `refined`, with any label.
pub fn assert_same_detections(original: &TrajectoryDataset, refined: &TrajectoryDataset) {
    let mut a: Vec<usize> = original.detections().iter().map(|d| d.index).collect();
    let mut b: Vec<usize> = refined.detections().iter().map(|d| d.index).collect();
    a.sort_unstable();
    b.sort_unstable();
    assert_eq!(a, b);
}

/// No real track holds two detections of the same frame.
pub fn assert_one_detection_per_frame(dataset: &TrajectoryDataset) {
    for (id, rows) in dataset.tracks() {
        let mut frames: Vec<u32> = rows.iter().map(|&r| dataset.detections()[r].frame).collect();
        frames.sort_unstable();
        let n = frames.len();
        frames.dedup();
        assert_eq!(frames.len(), n, "track {id} has same-frame duplicates");
    }
}
