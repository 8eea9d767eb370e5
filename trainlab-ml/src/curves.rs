//! Per-epoch views of smoothed curves.
//!
//! A curve holds every logged point of a run, checkpoint after checkpoint.
//! Reshaped into one row per epoch it yields a mean and a spread per epoch,
//! which is what the figures draw.

use ndarray::{Array1, Array2, Axis};

use crate::error::MlError;

/// A curve reshaped to `(epochs, points per epoch)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMatrix {
    values: Array2<f64>,
}

impl EpochMatrix {
    /// Reshape a curve into one row per epoch.
    pub fn from_series(series: Vec<f64>, epochs: usize) -> Result<Self, MlError> {
        if epochs == 0 {
            return Err(MlError::shape("cannot reshape a curve into zero epochs"));
        }
        if series.is_empty() {
            return Err(MlError::shape("cannot reshape an empty curve"));
        }
        if series.len() % epochs != 0 {
            return Err(MlError::shape(format!(
                "cannot reshape a curve of {} points into {epochs} epochs",
                series.len()
            )));
        }
        let per_epoch = series.len() / epochs;
        let values = Array2::from_shape_vec((epochs, per_epoch), series)?;
        Ok(Self { values })
    }

    pub fn epochs(&self) -> usize {
        self.values.nrows()
    }

    pub fn points_per_epoch(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Mean and population standard deviation of every epoch.
    pub fn band(&self) -> Band {
        let mean = self
            .values
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(self.epochs()));
        let std = self.values.std_axis(Axis(1), 0.0);
        Band {
            mean: mean.to_vec(),
            std: std.to_vec(),
        }
    }
}

/// Per-epoch mean with its ± one standard deviation envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Band {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.std).map(|(m, s)| m + s).collect()
    }

    pub fn lower(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.std).map(|(m, s)| m - s).collect()
    }

    /// Smallest and largest strictly positive values of the envelope, if any.
    pub fn positive_extent(&self) -> Option<(f64, f64)> {
        self.upper()
            .into_iter()
            .chain(self.lower())
            .chain(self.mean.iter().copied())
            .filter(|v| v.is_finite() && *v > 0.0)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// All experiments must share one epoch count before their curves can be merged.
pub fn check_same_epochs(latest_epochs: &[usize]) -> Result<usize, MlError> {
    let Some(&first) = latest_epochs.first() else {
        return Err(MlError::invalid_input("no experiment to merge"));
    };
    if latest_epochs.iter().any(|&e| e != first) {
        return Err(MlError::shape(
            "All experiments must have the same number of epochs to merge them",
        ));
    }
    Ok(first)
}

/// Merged figures stack curves of different runs, which need equal lengths.
pub fn check_same_length<S: AsRef<[f64]>>(curves: &[S]) -> Result<(), MlError> {
    let mut lengths = curves.iter().map(|c| c.as_ref().len());
    if let Some(first) = lengths.next() {
        if let Some(other) = lengths.find(|&l| l != first) {
            return Err(MlError::shape(format!(
                "cannot merge curves of {first} and {other} points"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reshape_rows_are_epochs() {
        let matrix = EpochMatrix::from_series(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2).unwrap();
        assert_eq!(matrix.epochs(), 2);
        assert_eq!(matrix.points_per_epoch(), 3);
        assert_eq!(matrix.values().row(1).to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_band_mean_and_population_std() {
        let matrix = EpochMatrix::from_series(vec![1.0, 3.0, 10.0, 10.0], 2).unwrap();
        let band = matrix.band();
        assert_eq!(band.mean, vec![2.0, 10.0]);
        assert_eq!(band.std, vec![1.0, 0.0]);
        assert_eq!(band.upper(), vec![3.0, 10.0]);
        assert_eq!(band.lower(), vec![1.0, 10.0]);
    }

    #[test]
    fn test_reshape_rejects_ragged_curves() {
        let err = EpochMatrix::from_series(vec![1.0; 7], 2).unwrap_err();
        assert!(matches!(err, MlError::Shape(_)));
        assert!(EpochMatrix::from_series(vec![], 2).is_err());
        assert!(EpochMatrix::from_series(vec![1.0], 0).is_err());
    }

    #[test]
    fn test_positive_extent_skips_non_positive() {
        let band = Band {
            mean: vec![0.5, 2.0],
            std: vec![1.0, 0.5],
        };
        // lower envelope is [-0.5, 1.5]
        assert_eq!(band.positive_extent(), Some((0.5, 2.5)));

        let band = Band {
            mean: vec![0.0],
            std: vec![0.0],
        };
        assert_eq!(band.positive_extent(), None);
    }

    #[test]
    fn test_check_same_epochs() {
        assert_eq!(check_same_epochs(&[4, 4, 4]).unwrap(), 4);
        let err = check_same_epochs(&[4, 5]).unwrap_err();
        assert!(err.to_string().contains("same number of epochs"));
        assert!(check_same_epochs(&[]).is_err());
    }

    #[test]
    fn test_check_same_length() {
        assert!(check_same_length(&[vec![1.0, 2.0], vec![3.0, 4.0]]).is_ok());
        assert!(check_same_length(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(check_same_length::<Vec<f64>>(&[]).is_ok());
    }
}
