//! Trial evaluation for the interface size search

use std::time::Instant;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::autoencoder::{AutoencoderManager, TrainingMode};
use crate::error::Result;
use crate::plugins::PluginRegistry;
use crate::training::ReconstructionScore;
use crate::transform::TrainOptions;

/// Outcome of training and scoring one candidate size
#[derive(Debug)]
pub struct Trial<M> {
    pub model: M,
    pub score: ReconstructionScore,
    /// Epochs run, when the trial trained a model
    pub epochs: Option<usize>,
}

/// Summary of one trial, kept in the search trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIteration {
    /// 1-based iteration number
    pub iteration: usize,
    pub interface_size: usize,
    pub score: ReconstructionScore,
    /// Value of the configured metric compared against the threshold
    pub error: f64,
    pub epochs: Option<usize>,
    /// Wall-clock time of the trial in seconds
    pub train_time: f64,
}

/// Builds, trains and scores a model for a given interface size
pub trait TrialRunner {
    type Model;

    /// Width of one input sample; the search stays below it
    fn input_dim(&self) -> usize;

    /// Evaluate a freshly initialised model of the given size
    fn run_trial(&mut self, interface_size: usize) -> Result<Trial<Self::Model>>;
}

/// Trial runner that trains a new autoencoder per candidate size
#[derive(Debug)]
pub struct AutoencoderTrial<'a> {
    registry: &'a PluginRegistry,
    encoder_plugin: String,
    decoder_plugin: String,
    plugin_params: Map<String, Value>,
    options: TrainOptions,
    mode: TrainingMode,
    data: &'a Array2<f64>,
    num_channels: usize,
}

impl<'a> AutoencoderTrial<'a> {
    /// `data` holds one flattened sample per row
    pub fn new(
        registry: &'a PluginRegistry,
        data: &'a Array2<f64>,
        options: TrainOptions,
        mode: TrainingMode,
    ) -> Self {
        Self {
            registry,
            encoder_plugin: "default".to_string(),
            decoder_plugin: "default".to_string(),
            plugin_params: Map::new(),
            options,
            mode,
            data,
            num_channels: 1,
        }
    }

    pub fn with_plugins(mut self, encoder: &str, decoder: &str) -> Self {
        self.encoder_plugin = encoder.to_string();
        self.decoder_plugin = decoder.to_string();
        self
    }

    pub fn with_plugin_params(mut self, params: Map<String, Value>) -> Self {
        self.plugin_params = params;
        self
    }

    pub fn with_num_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = num_channels.max(1);
        self
    }

    /// Fresh, untrained coordinator with the configured plugins
    pub fn new_manager(&self) -> Result<AutoencoderManager> {
        let mut encoder = self.registry.create_encoder(&self.encoder_plugin)?;
        let mut decoder = self.registry.create_decoder(&self.decoder_plugin)?;
        encoder.set_params(&self.plugin_params)?;
        decoder.set_params(&self.plugin_params)?;
        Ok(AutoencoderManager::new(
            encoder,
            decoder,
            self.options.clone(),
            self.mode,
        ))
    }
}

impl TrialRunner for AutoencoderTrial<'_> {
    type Model = AutoencoderManager;

    fn input_dim(&self) -> usize {
        self.data.ncols()
    }

    fn run_trial(&mut self, interface_size: usize) -> Result<Trial<AutoencoderManager>> {
        let mut manager = self.new_manager()?;
        manager.build(self.data.ncols(), interface_size, self.num_channels)?;
        let history = manager.train(self.data)?;
        let score = manager.evaluate(self.data)?;
        Ok(Trial {
            model: manager,
            score,
            epochs: Some(history.epochs_run()),
        })
    }
}

/// Run a trial and record it as a search iteration
pub(super) fn timed_trial<R: TrialRunner>(
    runner: &mut R,
    iteration: usize,
    interface_size: usize,
    metric: crate::training::ErrorMetric,
) -> Result<(Trial<R::Model>, SearchIteration)> {
    let start = Instant::now();
    let trial = runner.run_trial(interface_size)?;
    let record = SearchIteration {
        iteration,
        interface_size,
        score: trial.score,
        error: trial.score.metric(metric),
        epochs: trial.epochs,
        train_time: start.elapsed().as_secs_f64(),
    };
    Ok((trial, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TrainerConfig;

    #[test]
    fn test_autoencoder_trial_trains_fresh_model() {
        let registry = PluginRegistry::with_builtin();
        let data = Array2::from_shape_fn((24, 6), |(i, j)| ((i * 3 + j) % 7) as f64 / 7.0);
        let options = TrainerConfig {
            epochs: 3,
            ..Default::default()
        };
        let mut runner = AutoencoderTrial::new(&registry, &data, options, TrainingMode::Joint);

        assert_eq!(runner.input_dim(), 6);
        let trial = runner.run_trial(2).unwrap();
        assert_eq!(trial.model.latent_dim().unwrap(), 2);
        assert_eq!(trial.epochs, Some(3));
        assert!(trial.score.mse.is_finite());
    }

    #[test]
    fn test_unknown_plugin_fails_trial() {
        let registry = PluginRegistry::with_builtin();
        let data = Array2::zeros((4, 4));
        let mut runner = AutoencoderTrial::new(
            &registry,
            &data,
            TrainerConfig::default(),
            TrainingMode::Joint,
        )
        .with_plugins("default", "transformer");
        assert!(runner.run_trial(2).is_err());
    }
}
