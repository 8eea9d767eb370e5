//! Savitzky–Golay smoothing of loss and perplexity curves.
//!
//! Every output point is the value, at that point, of the least-squares
//! polynomial fitted over a window of samples. Interior points use the window
//! centred on them; the first and last `window / 2` points reuse the polynomial
//! fitted to the first and last full window.

use crate::error::MlError;
use trainlab_core::PlotConfig;

/// Largest window applied to a curve.
pub const MAXIMUM_WINDOW_LENGTH: usize = 201;

/// Order of the fitted polynomial.
pub const POLYORDER: usize = 7;

/// Curve smoother carrying the window cap and polynomial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smoother {
    pub max_window_length: usize,
    pub polyorder: usize,
}

impl Default for Smoother {
    fn default() -> Self {
        Self {
            max_window_length: MAXIMUM_WINDOW_LENGTH,
            polyorder: POLYORDER,
        }
    }
}

impl From<&PlotConfig> for Smoother {
    fn from(config: &PlotConfig) -> Self {
        Self {
            max_window_length: config.max_window_length,
            polyorder: config.polyorder,
        }
    }
}

impl Smoother {
    /// Window used for a curve of `len` samples: the largest odd length not
    /// above `len`, capped at `max_window_length`.
    pub fn window_for(&self, len: usize) -> usize {
        let odd_len = if len % 2 == 1 { len } else { len.saturating_sub(1) };
        odd_len.min(self.max_window_length)
    }

    /// Smooth a whole curve.
    pub fn smooth(&self, values: &[f64]) -> Result<Vec<f64>, MlError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        savgol_filter(values, self.window_for(values.len()), self.polyorder)
    }
}

/// Smooth a curve with the default window cap and order.
pub fn smooth_curve(values: &[f64]) -> Result<Vec<f64>, MlError> {
    Smoother::default().smooth(values)
}

/// Apply a Savitzky–Golay filter with an explicit window length.
///
/// `window` must be odd and no larger than the curve. A `polyorder` that does
/// not fit in the window is lowered to `window - 1`.
pub fn savgol_filter(values: &[f64], window: usize, polyorder: usize) -> Result<Vec<f64>, MlError> {
    let n = values.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if window == 0 || window % 2 == 0 {
        return Err(MlError::invalid_input(format!(
            "window length must be a positive odd number, got {window}"
        )));
    }
    if window > n {
        return Err(MlError::invalid_input(format!(
            "window length {window} exceeds curve length {n}"
        )));
    }

    let order = polyorder.min(window - 1);
    let projection = Projection::new(window, order);
    let half = window / 2;

    let mut smoothed = Vec::with_capacity(n);

    let head = &values[..window];
    for row in 0..half {
        smoothed.push(projection.apply(row, head));
    }

    for center in half..n - half {
        smoothed.push(projection.apply(half, &values[center - half..=center + half]));
    }

    let tail = &values[n - window..];
    for row in window - half..window {
        smoothed.push(projection.apply(row, tail));
    }

    Ok(smoothed)
}

/// Orthogonal projection onto polynomials of degree `order` sampled on a window.
///
/// Row `i` holds the weights that evaluate the fitted polynomial at sample `i`.
struct Projection {
    window: usize,
    weights: Vec<f64>,
}

impl Projection {
    fn new(window: usize, order: usize) -> Self {
        let basis = orthonormal_basis(window, order);
        let mut weights = vec![0.0; window * window];
        for q in &basis {
            for i in 0..window {
                for j in 0..window {
                    weights[i * window + j] += q[i] * q[j];
                }
            }
        }
        Self { window, weights }
    }

    fn apply(&self, row: usize, samples: &[f64]) -> f64 {
        let weights = &self.weights[row * self.window..(row + 1) * self.window];
        weights.iter().zip(samples).map(|(w, y)| w * y).sum()
    }
}

/// Orthonormal basis of the Vandermonde columns `t^0 .. t^order`.
///
/// Abscissae are scaled to [-1, 1] so high orders stay well conditioned; the
/// projection itself does not depend on that scaling.
fn orthonormal_basis(window: usize, order: usize) -> Vec<Vec<f64>> {
    let half = (window / 2).max(1) as f64;
    let center = (window / 2) as f64;
    let abscissae: Vec<f64> = (0..window).map(|j| (j as f64 - center) / half).collect();

    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(order + 1);
    for power in 0..=order {
        let mut column: Vec<f64> = abscissae.iter().map(|t| t.powi(power as i32)).collect();

        // Two Gram–Schmidt passes.
        for _ in 0..2 {
            for q in &basis {
                let dot: f64 = q.iter().zip(&column).map(|(a, b)| a * b).sum();
                for (c, qi) in column.iter_mut().zip(q) {
                    *c -= dot * qi;
                }
            }
        }

        let norm = column.iter().map(|c| c * c).sum::<f64>().sqrt();
        if norm <= f64::EPSILON {
            continue;
        }
        for c in &mut column {
            *c /= norm;
        }
        basis.push(column);
    }
    basis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() <= tol, "index {i}: {a} != {e}");
        }
    }

    #[test]
    fn test_window_selection() {
        let smoother = Smoother::default();
        assert_eq!(smoother.window_for(10), 9);
        assert_eq!(smoother.window_for(11), 11);
        assert_eq!(smoother.window_for(1_000), 201);
        assert_eq!(smoother.window_for(1), 1);
    }

    #[test]
    fn test_classic_five_point_quadratic_weights() {
        // Impulse response of the 5-point quadratic filter: [-3, 12, 17, 12, -3] / 35.
        let mut impulse = vec![0.0; 9];
        impulse[4] = 1.0;
        let smoothed = savgol_filter(&impulse, 5, 2).unwrap();
        let expected = [-3.0 / 35.0, 12.0 / 35.0, 17.0 / 35.0, 12.0 / 35.0, -3.0 / 35.0];
        assert_close(&smoothed[2..7], &expected, 1e-12);
    }

    #[test]
    fn test_polynomials_are_preserved() {
        let cubic: Vec<f64> = (0..40)
            .map(|i| {
                let x = i as f64 * 0.1;
                0.5 * x * x * x - 2.0 * x * x + x + 3.0
            })
            .collect();
        let smoothed = savgol_filter(&cubic, 11, 3).unwrap();
        assert_close(&smoothed, &cubic, 1e-9);
    }

    #[test]
    fn test_high_order_large_window_stays_stable() {
        let line: Vec<f64> = (0..500).map(|i| 4.0 - i as f64 * 0.002).collect();
        let smoothed = smooth_curve(&line).unwrap();
        assert_close(&smoothed, &line, 1e-8);
    }

    #[test]
    fn test_window_of_one_is_identity() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let smoothed = savgol_filter(&values, 1, 7).unwrap();
        assert_close(&smoothed, &values, 1e-12);
    }

    #[test]
    fn test_short_curve_lowers_order() {
        // 4 samples -> window 3, order lowered to 2: the quadratic through
        // three points reproduces them.
        let values = [2.0, 8.0, 1.0, 6.0];
        let smoothed = smooth_curve(&values).unwrap();
        assert_eq!(smoothed.len(), 4);
        assert_close(&smoothed[..2], &values[..2], 1e-9);
    }

    #[test]
    fn test_noise_is_reduced() {
        let noisy: Vec<f64> = (0..300)
            .map(|i| 1.0 + if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        let smoothed = smooth_curve(&noisy).unwrap();
        let max_dev = smoothed[100..200]
            .iter()
            .map(|v| (v - 1.0).abs())
            .fold(0.0, f64::max);
        assert!(max_dev < 0.05, "max deviation {max_dev}");
    }

    #[test]
    fn test_invalid_windows() {
        assert!(savgol_filter(&[1.0, 2.0, 3.0], 2, 1).is_err());
        assert!(savgol_filter(&[1.0, 2.0, 3.0], 5, 1).is_err());
        assert!(savgol_filter(&[1.0, 2.0, 3.0], 0, 1).is_err());
        assert!(savgol_filter(&[], 5, 1).unwrap().is_empty());
    }
}
