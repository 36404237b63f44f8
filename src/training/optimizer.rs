//! Adam optimizer with per-tensor gradient norm clipping

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

use super::layers::LayerGradients;
use super::network::Network;

/// Adam configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    /// Maximum L2 norm of each gradient tensor
    pub clip_norm: Option<f64>,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            clip_norm: Some(1.0),
        }
    }
}

impl AdamConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }
}

#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn zeros(shape: D) -> Self {
        Self {
            m: Array::zeros(shape.clone()),
            v: Array::zeros(shape),
        }
    }
}

#[derive(Debug, Clone)]
struct LayerState {
    weights: Moments<ndarray::Ix2>,
    bias: Moments<ndarray::Ix1>,
}

/// Adam state for a single network
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    step: i32,
    state: Vec<Option<LayerState>>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            step: 0,
            state: Vec::new(),
        }
    }

    /// Apply one update to `network` using gradients aligned with its layers
    pub fn step(&mut self, network: &mut Network, gradients: &[LayerGradients]) {
        self.step += 1;
        let layers = network.layers_mut();
        if self.state.len() != layers.len() {
            self.state = vec![None; layers.len()];
        }

        let bias_correction1 = 1.0 - self.config.beta1.powi(self.step);
        let bias_correction2 = 1.0 - self.config.beta2.powi(self.step);

        for ((layer, grads), slot) in layers.iter_mut().zip(gradients).zip(self.state.iter_mut()) {
            let Some((weights, bias)) = layer.params_mut() else {
                continue;
            };
            let state = slot.get_or_insert_with(|| LayerState {
                weights: Moments::zeros(weights.raw_dim()),
                bias: Moments::zeros(bias.raw_dim()),
            });

            update(
                weights,
                &grads.weights,
                &mut state.weights,
                &self.config,
                bias_correction1,
                bias_correction2,
            );
            update(
                bias,
                &grads.bias,
                &mut state.bias,
                &self.config,
                bias_correction1,
                bias_correction2,
            );
        }
    }
}

fn update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    moments: &mut Moments<D>,
    config: &AdamConfig,
    bias_correction1: f64,
    bias_correction2: f64,
) {
    let scale = match config.clip_norm {
        Some(max_norm) => {
            let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm > max_norm { max_norm / norm } else { 1.0 }
        }
        None => 1.0,
    };

    Zip::from(param)
        .and(grad)
        .and(&mut moments.m)
        .and(&mut moments.v)
        .for_each(|p, &g, m, v| {
            let g = g * scale;
            *m = config.beta1 * *m + (1.0 - config.beta1) * g;
            *v = config.beta2 * *v + (1.0 - config.beta2) * g * g;
            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;
            *p -= config.learning_rate * m_hat / (v_hat.sqrt() + config.epsilon);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::layers::{Activation, DenseLayer, Layer};
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_step_moves_against_gradient() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut net = Network::new(vec![Layer::Dense(DenseLayer::new(
            2,
            1,
            Activation::Linear,
            &mut rng,
        ))])
        .unwrap();

        let x = Array2::from_elem((1, 2), 1.0);
        let before = net.predict(&x).unwrap()[[0, 0]];

        // Gradient of the plain output sum pushes the output down.
        let pass = net.forward_train(&x);
        let (grads, _) = net.backward(&pass, &Array2::ones((1, 1)));
        let mut adam = Adam::new(AdamConfig::default().with_learning_rate(0.1));
        adam.step(&mut net, &grads);

        let after = net.predict(&x).unwrap()[[0, 0]];
        assert!(after < before);
    }
}
