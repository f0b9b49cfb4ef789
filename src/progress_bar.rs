//! Progress reporting for the long-running stages (grouping and refinement rounds).
//!
//! Components
//! -----------------
//! * [`RoundTimer`] – Lap timer with a smoothed **exponential moving average** (EMA) of the lap
//!   durations, `ema ← α·dt + (1–α)·ema`. The first lap initializes the average.
//! * [`fmt_dur`] – Human-readable [`Duration`] formatter (`"253µs"`, `"42ms"`, `"3.14s"`).
//! * [`stage_bar`] – An `indicatif` bar with the crate's common style.
//!
//! This module is enabled only with the `progress` feature.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub struct RoundTimer {
    last: Instant,
    alpha: f64,
    ema_secs: Option<f64>,
}

impl RoundTimer {
    pub fn new(alpha: f64) -> Self {
        RoundTimer {
            last: Instant::now(),
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            ema_secs: None,
        }
    }

    /// Close the current lap and return its duration.
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;

        let secs = dt.as_secs_f64();
        self.ema_secs = Some(match self.ema_secs {
            None => secs,
            Some(ema) => self.alpha * secs + (1.0 - self.alpha) * ema,
        });
        dt
    }

    /// Smoothed lap duration, zero before the first lap.
    pub fn average(&self) -> Duration {
        self.ema_secs
            .map_or(Duration::ZERO, Duration::from_secs_f64)
    }
}

pub fn fmt_dur(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f32()),
    }
}

/// Progress bar for one pipeline stage, `prefix` names the stage.
pub fn stage_bar(len: u64, prefix: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len.max(1));
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix:>10} {bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
    ) {
        pb.set_style(style);
    }
    pb.set_prefix(prefix);
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}
