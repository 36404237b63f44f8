//! Sequential feed-forward network

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::layers::{Layer, LayerGradients};
use crate::error::{ExtractorError, Result};

/// Intermediate values kept from a training forward pass
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Input to each layer
    inputs: Vec<Array2<f64>>,
    /// Pre-activation output of each layer
    pre_activations: Vec<Array2<f64>>,
    /// Final network output
    pub output: Array2<f64>,
}

/// Ordered stack of layers with matching dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Create a network, checking that consecutive layer widths agree
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(ExtractorError::ConfigError(
                "a network needs at least one layer".to_string(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(ExtractorError::ShapeMismatch {
                    expected: format!("layer {} input of width {}", i + 1, pair[0].output_dim()),
                    actual: format!("width {}", pair[1].input_dim()),
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map(Layer::input_dim).unwrap_or(0)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(Layer::output_dim).unwrap_or(0)
    }

    pub fn num_params(&self) -> usize {
        self.layers.iter().map(Layer::num_params).sum()
    }

    /// Inference forward pass
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(x)?;
        let mut current = x.clone();
        for layer in &self.layers {
            current = layer.forward(&current).1;
        }
        Ok(current)
    }

    /// Forward pass that keeps what `backward` needs
    pub fn forward_train(&self, x: &Array2<f64>) -> ForwardPass {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut current = x.clone();

        for layer in &self.layers {
            let (z, a) = layer.forward(&current);
            inputs.push(current);
            pre_activations.push(z);
            current = a;
        }

        ForwardPass {
            inputs,
            pre_activations,
            output: current,
        }
    }

    /// Backpropagate `grad_output` through every layer.
    ///
    /// Returns per-layer gradients in layer order and the gradient with
    /// respect to the network input.
    pub fn backward(
        &self,
        pass: &ForwardPass,
        grad_output: &Array2<f64>,
    ) -> (Vec<LayerGradients>, Array2<f64>) {
        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut delta = grad_output.clone();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let (grads, grad_input) =
                layer.backward(&pass.inputs[i], &pass.pre_activations[i], &delta);
            gradients.push(grads);
            delta = grad_input;
        }

        gradients.reverse();
        (gradients, delta)
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.input_dim() {
            return Err(ExtractorError::ShapeMismatch {
                expected: format!("(n, {})", self.input_dim()),
                actual: format!("{:?}", x.shape()),
            });
        }
        Ok(())
    }
}
