//! Reconstruction losses

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Transition point between the quadratic and linear regions of the Huber loss
pub const HUBER_DELTA: f64 = 1.0;

/// Loss minimised during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Mean squared error
    #[default]
    Mse,
    /// Huber loss, quadratic below `HUBER_DELTA` and linear above
    Huber,
}

impl LossKind {
    /// Mean loss over every element
    pub fn value(&self, prediction: &Array2<f64>, target: &Array2<f64>) -> f64 {
        let n = prediction.len().max(1) as f64;
        let total: f64 = prediction
            .iter()
            .zip(target.iter())
            .map(|(p, t)| {
                let d = p - t;
                match self {
                    LossKind::Mse => d * d,
                    LossKind::Huber if d.abs() <= HUBER_DELTA => 0.5 * d * d,
                    LossKind::Huber => HUBER_DELTA * (d.abs() - 0.5 * HUBER_DELTA),
                }
            })
            .sum();
        total / n
    }

    /// Gradient of `value` with respect to the prediction
    pub fn gradient(&self, prediction: &Array2<f64>, target: &Array2<f64>) -> Array2<f64> {
        let n = prediction.len().max(1) as f64;
        let diff = prediction - target;
        match self {
            LossKind::Mse => diff.mapv(|d| 2.0 * d / n),
            LossKind::Huber => diff.mapv(|d| d.clamp(-HUBER_DELTA, HUBER_DELTA) / n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mse_value_and_gradient() {
        let p = array![[1.0, 2.0]];
        let t = array![[0.0, 4.0]];
        assert!((LossKind::Mse.value(&p, &t) - 2.5).abs() < 1e-12);
        assert_eq!(LossKind::Mse.gradient(&p, &t), array![[1.0, -2.0]]);
    }

    #[test]
    fn test_huber_is_linear_for_large_errors() {
        let p = array![[3.0, 0.5]];
        let t = array![[0.0, 0.0]];
        // 1.0 * (3.0 - 0.5) and 0.5 * 0.25
        let expected = (2.5 + 0.125) / 2.0;
        assert!((LossKind::Huber.value(&p, &t) - expected).abs() < 1e-12);
        assert_eq!(LossKind::Huber.gradient(&p, &t), array![[0.5, 0.25]]);
    }
}
