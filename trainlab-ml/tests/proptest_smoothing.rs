//! Property-based tests for curve smoothing and epoch bands.

use proptest::prelude::*;

use trainlab_ml::curves::EpochMatrix;
use trainlab_ml::smoothing::{Smoother, savgol_filter, smooth_curve};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + b.abs())
}

proptest! {
    #[test]
    fn smoothing_keeps_length(values in prop::collection::vec(-1e3f64..1e3, 0..400)) {
        let smoothed = smooth_curve(&values).unwrap();
        prop_assert_eq!(smoothed.len(), values.len());
    }

    #[test]
    fn smoothing_preserves_lines(
        len in 1usize..300,
        intercept in -100f64..100.0,
        slope in -5f64..5.0,
    ) {
        let values: Vec<f64> = (0..len).map(|i| intercept + slope * i as f64).collect();
        let smoothed = smooth_curve(&values).unwrap();
        for (s, v) in smoothed.iter().zip(&values) {
            prop_assert!(close(*s, *v), "{} vs {}", s, v);
        }
    }

    #[test]
    fn window_is_odd_and_bounded(len in 1usize..1000, max in 1usize..50) {
        let smoother = Smoother { max_window_length: 2 * max + 1, polyorder: 3 };
        let window = smoother.window_for(len);
        prop_assert_eq!(window % 2, 1);
        prop_assert!(window <= len);
        prop_assert!(window <= 2 * max + 1);
    }

    #[test]
    fn odd_windows_accept_any_order(
        values in prop::collection::vec(-10f64..10.0, 1..60),
        polyorder in 0usize..12,
    ) {
        let window = if values.len() % 2 == 1 { values.len() } else { values.len() - 1 };
        let smoothed = savgol_filter(&values, window, polyorder).unwrap();
        prop_assert_eq!(smoothed.len(), values.len());
        prop_assert!(smoothed.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn band_has_one_point_per_epoch(epochs in 1usize..20, per_epoch in 1usize..20) {
        let values: Vec<f64> = (0..epochs * per_epoch).map(|i| i as f64).collect();
        let band = EpochMatrix::from_series(values, epochs).unwrap().band();
        prop_assert_eq!(band.len(), epochs);
        prop_assert!(band.std.iter().all(|s| *s >= 0.0));
        // Rows are increasing runs, so epoch means are too.
        prop_assert!(band.mean.windows(2).all(|w| w[0] < w[1]));
    }
}
