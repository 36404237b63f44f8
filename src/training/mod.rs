//! Model training module
//!
//! Provides the numeric building blocks of the encoder and decoder models:
//! - Dense, 1-D convolution and upsampling layers
//! - Sequential networks with backpropagation
//! - MSE and Huber losses
//! - Adam with gradient clipping
//! - Mini-batch trainer with early stopping
//! - Reconstruction metrics

mod layers;
mod loss;
mod metrics;
mod network;
mod optimizer;
mod trainer;

pub use layers::{Activation, Conv1dLayer, DenseLayer, Layer, LayerGradients, Upsample1dLayer};
pub use loss::{LossKind, HUBER_DELTA};
pub use metrics::{score_reconstruction, ErrorMetric, ReconstructionScore};
pub use network::{ForwardPass, Network};
pub use optimizer::{Adam, AdamConfig};
pub use trainer::{Trainer, TrainerConfig, TrainingHistory};
