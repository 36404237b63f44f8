//! Trainable layers operating on flattened `(batch, features)` matrices.
//!
//! Convolutional and upsampling layers interpret a feature row as a
//! `(length, channels)` sequence stored row-major, i.e. feature index
//! `t * channels + c`.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ExtractorError, Result};

/// Activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    #[serde(rename = "relu")]
    ReLU,
    /// Sigmoid
    #[serde(rename = "sigmoid")]
    Sigmoid,
    /// Hyperbolic tangent
    #[serde(rename = "tanh")]
    Tanh,
    /// Linear (identity)
    #[serde(rename = "linear")]
    Linear,
}

impl Activation {
    pub fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(sigmoid),
            Activation::Tanh => z.mapv(|v| v.tanh()),
            Activation::Linear => z.clone(),
        }
    }

    pub fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => z.mapv(|v| {
                let s = sigmoid(v);
                s * (1.0 - s)
            }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

impl FromStr for Activation {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::ReLU),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "linear" | "identity" => Ok(Activation::Linear),
            other => Err(ExtractorError::invalid_parameter(
                "activation",
                other,
                "expected one of relu, sigmoid, tanh, linear",
            )),
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Xavier/Glorot uniform initialisation
fn glorot(n_in: usize, n_out: usize, rng: &mut Xoshiro256PlusPlus) -> Array2<f64> {
    let scale = (6.0 / (n_in + n_out) as f64).sqrt();
    Array2::from_shape_fn((n_in, n_out), |_| rng.gen::<f64>() * 2.0 * scale - scale)
}

/// Gradients of one layer's parameters. Empty for parameterless layers.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl LayerGradients {
    fn empty() -> Self {
        Self {
            weights: Array2::zeros((0, 0)),
            bias: Array1::zeros(0),
        }
    }
}

/// Fully connected layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

impl DenseLayer {
    pub fn new(n_in: usize, n_out: usize, activation: Activation, rng: &mut Xoshiro256PlusPlus) -> Self {
        Self {
            weights: glorot(n_in, n_out, rng),
            bias: Array1::zeros(n_out),
            activation,
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let z = x.dot(&self.weights) + &self.bias;
        let a = self.activation.apply(&z);
        (z, a)
    }

    fn backward(
        &self,
        input: &Array2<f64>,
        z: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> (LayerGradients, Array2<f64>) {
        let delta = grad_output * &self.activation.derivative(z);
        let grads = LayerGradients {
            weights: input.t().dot(&delta),
            bias: delta.sum_axis(Axis(0)),
        };
        let grad_input = delta.dot(&self.weights.t());
        (grads, grad_input)
    }
}

/// 1-D convolution with valid padding.
///
/// Kernels are stored as a `(kernel_size * in_channels, filters)` matrix so a
/// forward pass is a single matrix product over extracted patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv1dLayer {
    kernels: Array2<f64>,
    bias: Array1<f64>,
    kernel_size: usize,
    stride: usize,
    in_len: usize,
    in_channels: usize,
    activation: Activation,
}

impl Conv1dLayer {
    pub fn new(
        in_len: usize,
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        stride: usize,
        activation: Activation,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Self> {
        if kernel_size == 0 || kernel_size > in_len {
            return Err(ExtractorError::invalid_parameter(
                "kernel_size",
                kernel_size,
                format!("must be in [1, {}]", in_len),
            ));
        }
        if stride == 0 || filters == 0 || in_channels == 0 {
            return Err(ExtractorError::invalid_parameter(
                "conv1d",
                format!("stride={}, filters={}, channels={}", stride, filters, in_channels),
                "all must be positive",
            ));
        }

        let patch = kernel_size * in_channels;
        Ok(Self {
            kernels: glorot(patch, filters, rng),
            bias: Array1::zeros(filters),
            kernel_size,
            stride,
            in_len,
            in_channels,
            activation,
        })
    }

    pub fn out_len(&self) -> usize {
        (self.in_len - self.kernel_size) / self.stride + 1
    }

    pub fn filters(&self) -> usize {
        self.kernels.ncols()
    }

    fn im2col(&self, x: &Array2<f64>) -> Array2<f64> {
        let out_len = self.out_len();
        let step = self.stride * self.in_channels;
        Array2::from_shape_fn(
            (x.nrows() * out_len, self.kernel_size * self.in_channels),
            |(r, p)| x[[r / out_len, (r % out_len) * step + p]],
        )
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let out_len = self.out_len();
        let filters = self.filters();
        let cols = self.im2col(x);
        let z_rows = cols.dot(&self.kernels) + &self.bias;
        let z = Array2::from_shape_fn((x.nrows(), out_len * filters), |(b, j)| {
            z_rows[[b * out_len + j / filters, j % filters]]
        });
        let a = self.activation.apply(&z);
        (z, a)
    }

    fn backward(
        &self,
        input: &Array2<f64>,
        z: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> (LayerGradients, Array2<f64>) {
        let out_len = self.out_len();
        let filters = self.filters();
        let batch = input.nrows();

        let delta_flat = grad_output * &self.activation.derivative(z);
        let delta = Array2::from_shape_fn((batch * out_len, filters), |(r, f)| {
            delta_flat[[r / out_len, (r % out_len) * filters + f]]
        });

        let cols = self.im2col(input);
        let grads = LayerGradients {
            weights: cols.t().dot(&delta),
            bias: delta.sum_axis(Axis(0)),
        };

        let grad_cols = delta.dot(&self.kernels.t());
        let step = self.stride * self.in_channels;
        let mut grad_input = Array2::zeros(input.raw_dim());
        for (r, row) in grad_cols.rows().into_iter().enumerate() {
            let b = r / out_len;
            let start = (r % out_len) * step;
            for (p, g) in row.iter().enumerate() {
                grad_input[[b, start + p]] += *g;
            }
        }

        (grads, grad_input)
    }
}

/// Nearest-neighbour upsampling along the length axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upsample1dLayer {
    factor: usize,
    in_len: usize,
    channels: usize,
}

impl Upsample1dLayer {
    pub fn new(in_len: usize, channels: usize, factor: usize) -> Self {
        Self {
            factor: factor.max(1),
            in_len,
            channels: channels.max(1),
        }
    }

    fn source_index(&self, j: usize) -> usize {
        let t = j / self.channels;
        let c = j % self.channels;
        (t / self.factor) * self.channels + c
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let width = self.in_len * self.factor * self.channels;
        Array2::from_shape_fn((x.nrows(), width), |(b, j)| x[[b, self.source_index(j)]])
    }

    fn backward(&self, grad_output: &Array2<f64>) -> Array2<f64> {
        let mut grad_input = Array2::zeros((grad_output.nrows(), self.in_len * self.channels));
        for ((b, j), g) in grad_output.indexed_iter() {
            grad_input[[b, self.source_index(j)]] += *g;
        }
        grad_input
    }
}

/// A single network layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Dense(DenseLayer),
    Conv1d(Conv1dLayer),
    Upsample1d(Upsample1dLayer),
}

impl Layer {
    pub fn input_dim(&self) -> usize {
        match self {
            Layer::Dense(l) => l.weights.nrows(),
            Layer::Conv1d(l) => l.in_len * l.in_channels,
            Layer::Upsample1d(l) => l.in_len * l.channels,
        }
    }

    pub fn output_dim(&self) -> usize {
        match self {
            Layer::Dense(l) => l.weights.ncols(),
            Layer::Conv1d(l) => l.out_len() * l.filters(),
            Layer::Upsample1d(l) => l.in_len * l.factor * l.channels,
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            Layer::Dense(l) => l.weights.len() + l.bias.len(),
            Layer::Conv1d(l) => l.kernels.len() + l.bias.len(),
            Layer::Upsample1d(_) => 0,
        }
    }

    /// Forward pass returning `(pre_activation, activation)`
    pub fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        match self {
            Layer::Dense(l) => l.forward(x),
            Layer::Conv1d(l) => l.forward(x),
            Layer::Upsample1d(l) => {
                let a = l.forward(x);
                (a.clone(), a)
            }
        }
    }

    /// Backward pass returning parameter gradients and the gradient w.r.t. the input
    pub fn backward(
        &self,
        input: &Array2<f64>,
        z: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> (LayerGradients, Array2<f64>) {
        match self {
            Layer::Dense(l) => l.backward(input, z, grad_output),
            Layer::Conv1d(l) => l.backward(input, z, grad_output),
            Layer::Upsample1d(l) => (LayerGradients::empty(), l.backward(grad_output)),
        }
    }

    /// Mutable access to `(weights, bias)` for trainable layers
    pub fn params_mut(&mut self) -> Option<(&mut Array2<f64>, &mut Array1<f64>)> {
        match self {
            Layer::Dense(l) => Some((&mut l.weights, &mut l.bias)),
            Layer::Conv1d(l) => Some((&mut l.kernels, &mut l.bias)),
            Layer::Upsample1d(_) => None,
        }
    }
}
