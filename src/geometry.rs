//! # Planar geometry and order statistics
//!
//! Small numeric helpers shared by the grouper, the outlier pruning and the diffusion model:
//!
//! * [`distance`] / [`centroid`] – Euclidean geometry in image pixels, on top of
//!   [`nalgebra::Point2`],
//! * [`quantile`] / [`median`] – order statistics with **linear interpolation** between the
//!   two closest ranks (`pos = q × (n − 1)`), the convention of the particle-analysis tables
//!   this crate consumes,
//! * [`mean`] / [`population_std`] – first and second moments.
//!
//! Empty inputs yield `None` instead of `NaN` so that callers have to decide what an empty
//! group means for them.
use nalgebra::{Point2, Vector2};

use crate::constants::Pixel;

/// Euclidean distance between two image positions.
#[inline]
pub fn distance(a: &Point2<Pixel>, b: &Point2<Pixel>) -> Pixel {
    nalgebra::distance(a, b)
}

/// Arithmetic mean of a set of positions, `None` when the set is empty.
pub fn centroid<'a, I>(points: I) -> Option<Point2<Pixel>>
where
    I: IntoIterator<Item = &'a Point2<Pixel>>,
{
    let mut sum = Vector2::zeros();
    let mut count = 0usize;
    for p in points {
        sum += p.coords;
        count += 1;
    }
    (count > 0).then(|| Point2::from(sum / count as f64))
}

/// Quantile `q ∈ [0, 1]` of `values` with linear interpolation between ranks.
///
/// Arguments
/// -----------------
/// * `values`: unsorted samples (`NaN` are sorted last by [`f64::total_cmp`]).
/// * `q`: requested quantile, clamped into `[0, 1]`.
///
/// Return
/// ----------
/// * `None` if `values` is empty, the interpolated quantile otherwise.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

/// Same as [`quantile`] on an already sorted, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let pos = q.clamp(0.0, 1.0) * (n as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[inline]
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with the `1/N` normalization.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_345() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert_relative_eq!(distance(&a, &b), 5.0);
    }

    #[test]
    fn test_centroid() {
        let pts = [Point2::new(0.0, 0.0), Point2::new(2.0, 4.0)];
        let c = centroid(pts.iter()).unwrap();
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 2.0);
        assert!(centroid(std::iter::empty()).is_none());
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let v = [4.0, 1.0, 3.0, 2.0];
        // pos = 0.9 * 3 = 2.7 -> 3 + 0.7 * (4 - 3)
        assert_relative_eq!(quantile(&v, 0.9).unwrap(), 3.7, epsilon = 1e-12);
        assert_relative_eq!(median(&v).unwrap(), 2.5);
        assert_relative_eq!(quantile(&v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(quantile(&v, 1.0).unwrap(), 4.0);
        assert!(quantile(&[], 0.5).is_none());
    }

    #[test]
    fn test_moments() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&v).unwrap(), 5.0);
        assert_relative_eq!(population_std(&v).unwrap(), 2.0);
    }
}
