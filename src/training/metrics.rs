//! Reconstruction error metrics

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayBase, Data, Dimension, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractorError, Result};

/// Error between an original signal and its reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionScore {
    pub mse: f64,
    pub mae: f64,
}

impl ReconstructionScore {
    /// Value of the metric used to drive the interface size search
    pub fn metric(&self, metric: ErrorMetric) -> f64 {
        match metric {
            ErrorMetric::Mse => self.mse,
            ErrorMetric::Mae => self.mae,
        }
    }
}

/// Metric compared against the search threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMetric {
    #[default]
    Mse,
    Mae,
}

impl FromStr for ErrorMetric {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mse" => Ok(ErrorMetric::Mse),
            "mae" => Ok(ErrorMetric::Mae),
            other => Err(ExtractorError::invalid_parameter(
                "error_metric",
                other,
                "expected 'mse' or 'mae'",
            )),
        }
    }
}

impl fmt::Display for ErrorMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMetric::Mse => write!(f, "mse"),
            ErrorMetric::Mae => write!(f, "mae"),
        }
    }
}

/// Mean squared and mean absolute error between two arrays of equal shape
pub fn score_reconstruction<S1, S2, D>(
    original: &ArrayBase<S1, D>,
    reconstructed: &ArrayBase<S2, D>,
) -> Result<ReconstructionScore>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    if original.shape() != reconstructed.shape() {
        return Err(ExtractorError::shape_mismatch(
            original.shape(),
            reconstructed.shape(),
        ));
    }
    if original.is_empty() {
        return Err(ExtractorError::InvalidData(
            "cannot score an empty reconstruction".to_string(),
        ));
    }

    let mut squared = 0.0;
    let mut absolute = 0.0;
    Zip::from(original).and(reconstructed).for_each(|&a, &b| {
        let d = a - b;
        squared += d * d;
        absolute += d.abs();
    });

    let n = original.len() as f64;
    Ok(ReconstructionScore {
        mse: squared / n,
        mae: absolute / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_identical_arrays_score_zero() {
        let a = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i + j * k) as f64);
        let score = score_reconstruction(&a, &a).unwrap();
        assert_eq!(score.mse, 0.0);
        assert_eq!(score.mae, 0.0);
    }

    #[test]
    fn test_known_errors() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[1.0, 0.0], [3.0, 5.0]];
        let score = score_reconstruction(&a, &b).unwrap();
        assert!((score.mse - 5.0 / 4.0).abs() < 1e-12);
        assert!((score.mae - 3.0 / 4.0).abs() < 1e-12);
        assert_eq!(score.metric(ErrorMetric::Mae), score.mae);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = array![[1.0, 2.0]];
        let b = array![[1.0], [2.0]];
        assert!(matches!(
            score_reconstruction(&a, &b),
            Err(ExtractorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("MSE".parse::<ErrorMetric>().unwrap(), ErrorMetric::Mse);
        assert_eq!("mae".parse::<ErrorMetric>().unwrap(), ErrorMetric::Mae);
        assert!("rmse".parse::<ErrorMetric>().is_err());
    }
}
