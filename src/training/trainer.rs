//! Mini-batch trainer with early stopping
//!
//! Trains one or more networks chained end to end as a single pipeline: the
//! output of stage `i` feeds stage `i + 1` and the loss gradient flows back
//! through all of them in the same step.

use ndarray::{Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::layers::{Activation, DenseLayer, Layer};
use super::loss::LossKind;
use super::network::Network;
use super::optimizer::{Adam, AdamConfig};
use crate::error::{ExtractorError, Result};

/// Trainer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Epochs without improvement of the training loss before stopping (0 disables)
    pub patience: usize,
    /// Loss function
    pub loss: LossKind,
    /// Random seed for shuffling and auxiliary heads
    pub random_state: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.001,
            patience: 3,
            loss: LossKind::Mse,
            random_state: Some(42),
        }
    }
}

/// Loss trajectory of one training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean training loss per completed epoch
    pub losses: Vec<f64>,
    /// Epoch (0-based) whose parameters were kept
    pub best_epoch: usize,
    pub best_loss: f64,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn epochs_run(&self) -> usize {
        self.losses.len()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.losses.last().copied()
    }
}

/// Mini-batch gradient trainer
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }

    /// Fit a chain of networks so that `stages[last](...stages[0](input))`
    /// approximates `target`.
    ///
    /// The parameters from the epoch with the lowest training loss are
    /// restored before returning.
    pub fn fit(
        &self,
        stages: &mut [&mut Network],
        input: &Array2<f64>,
        target: &Array2<f64>,
    ) -> Result<TrainingHistory> {
        self.validate(stages, input, target)?;

        let n_samples = input.nrows();
        let batch_size = self.config.batch_size.min(n_samples);
        let mut rng = self.rng();
        let adam_config = AdamConfig::default().with_learning_rate(self.config.learning_rate);
        let mut optimizers: Vec<Adam> = stages.iter().map(|_| Adam::new(adam_config.clone())).collect();

        let mut history = TrainingHistory {
            best_loss: f64::INFINITY,
            ..Default::default()
        };
        let mut best: Vec<Network> = stages.iter().map(|s| (**s).clone()).collect();
        let mut wait = 0;
        let mut indices: Vec<usize> = (0..n_samples).collect();

        for epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in indices.chunks(batch_size) {
                let x_batch = input.select(Axis(0), batch);
                let y_batch = target.select(Axis(0), batch);

                let mut passes = Vec::with_capacity(stages.len());
                let mut current = x_batch;
                for stage in stages.iter() {
                    let pass = stage.forward_train(&current);
                    current = pass.output.clone();
                    passes.push(pass);
                }

                epoch_loss += self.config.loss.value(&current, &y_batch) * batch.len() as f64;
                let mut grad = self.config.loss.gradient(&current, &y_batch);

                for ((stage, pass), adam) in stages
                    .iter_mut()
                    .zip(passes.iter())
                    .zip(optimizers.iter_mut())
                    .rev()
                {
                    let (grads, grad_input) = stage.backward(pass, &grad);
                    adam.step(stage, &grads);
                    grad = grad_input;
                }
            }

            let epoch_loss = epoch_loss / n_samples as f64;
            if !epoch_loss.is_finite() {
                return Err(ExtractorError::InvalidData(format!(
                    "training diverged at epoch {} (loss = {})",
                    epoch + 1,
                    epoch_loss
                )));
            }
            history.losses.push(epoch_loss);
            debug!(epoch = epoch + 1, loss = epoch_loss, "epoch finished");

            if epoch_loss < history.best_loss {
                history.best_loss = epoch_loss;
                history.best_epoch = epoch;
                best = stages.iter().map(|s| (**s).clone()).collect();
                wait = 0;
            } else {
                wait += 1;
                if self.config.patience > 0 && wait >= self.config.patience {
                    history.stopped_early = true;
                    break;
                }
            }
        }

        for (stage, snapshot) in stages.iter_mut().zip(best) {
            **stage = snapshot;
        }

        Ok(history)
    }

    /// Fit a single network towards a target whose width may differ from the
    /// network output.
    ///
    /// When widths differ, a temporary linear readout maps the network output
    /// to the target during training and is discarded afterwards.
    pub fn fit_with_head(
        &self,
        network: &mut Network,
        input: &Array2<f64>,
        target: &Array2<f64>,
    ) -> Result<TrainingHistory> {
        if network.output_dim() == target.ncols() {
            return self.fit(&mut [network], input, target);
        }

        let mut rng = self.rng();
        let mut head = Network::new(vec![Layer::Dense(DenseLayer::new(
            network.output_dim(),
            target.ncols(),
            Activation::Linear,
            &mut rng,
        ))])?;
        self.fit(&mut [network, &mut head], input, target)
    }

    fn validate(
        &self,
        stages: &[&mut Network],
        input: &Array2<f64>,
        target: &Array2<f64>,
    ) -> Result<()> {
        if self.config.epochs == 0 {
            return Err(ExtractorError::invalid_parameter("epochs", 0, "must be positive"));
        }
        if self.config.batch_size == 0 {
            return Err(ExtractorError::invalid_parameter("batch_size", 0, "must be positive"));
        }
        if stages.is_empty() {
            return Err(ExtractorError::ConfigError("no networks to train".to_string()));
        }
        if input.nrows() == 0 {
            return Err(ExtractorError::InvalidData("training data is empty".to_string()));
        }
        if input.nrows() != target.nrows() {
            return Err(ExtractorError::shape_mismatch(
                &[input.nrows(), target.ncols()],
                target.shape(),
            ));
        }
        if input.iter().chain(target.iter()).any(|v| !v.is_finite()) {
            return Err(ExtractorError::InvalidData(
                "training data contains NaN or infinite values".to_string(),
            ));
        }

        let mut width = input.ncols();
        for (i, stage) in stages.iter().enumerate() {
            if stage.input_dim() != width {
                return Err(ExtractorError::ShapeMismatch {
                    expected: format!("stage {} input width {}", i, width),
                    actual: format!("width {}", stage.input_dim()),
                });
            }
            width = stage.output_dim();
        }
        if width != target.ncols() {
            return Err(ExtractorError::ShapeMismatch {
                expected: format!("target width {}", width),
                actual: format!("width {}", target.ncols()),
            });
        }
        Ok(())
    }
}
