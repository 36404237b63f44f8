//! Trainable encoder and decoder transforms
//!
//! Both roles share one capability set: size the model, train it, apply it,
//! persist it. Concrete variants:
//! - [`DenseTransform`] - stack of fully connected layers ("default", "ann")
//! - [`ConvTransform`] - 1-D convolution with dense readout ("cnn")

mod conv;
mod dense;

pub use conv::{ConvParams, ConvTransform};
pub use dense::{DenseParams, DenseTransform};

use std::fmt;

use ndarray::{Array2, ArrayBase, Data, Dimension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExtractorError, Result};
use crate::training::{
    score_reconstruction, Network, ReconstructionScore, Trainer, TrainerConfig, TrainingHistory,
};

/// Training options passed to a transform
pub type TrainOptions = TrainerConfig;

/// Direction a transform maps in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformRole {
    Encoder,
    Decoder,
}

impl fmt::Display for TransformRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformRole::Encoder => write!(f, "encoder"),
            TransformRole::Decoder => write!(f, "decoder"),
        }
    }
}

/// Extra shape information used when sizing a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHints {
    /// Channels per time step; feature rows are `(length, channels)` row-major
    pub num_channels: usize,
    /// Interface size requested by the search, before any rounding
    pub interface_size: usize,
    /// Seed for parameter initialisation
    pub seed: Option<u64>,
}

impl SizeHints {
    pub fn new(num_channels: usize, interface_size: usize) -> Self {
        Self {
            num_channels: num_channels.max(1),
            interface_size,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Capability contract shared by encoders and decoders
pub trait TrainableTransform: fmt::Debug {
    /// Registry name of the implementation
    fn name(&self) -> &str;

    fn role(&self) -> TransformRole;

    /// Rebuild parameters to map `input_dim -> output_dim`, discarding any
    /// learned state.
    fn configure_size(&mut self, input_dim: usize, output_dim: usize, hints: &SizeHints)
        -> Result<()>;

    /// Current model, or `NotConfigured` before `configure_size`/`load`
    fn network(&self) -> Result<&Network>;

    fn network_mut(&mut self) -> Result<&mut Network>;

    /// Persist parameters and plugin settings as JSON
    fn save(&self, path: &str) -> Result<()>;

    /// Restore a model written by `save`
    fn load(&mut self, path: &str) -> Result<()>;

    /// Apply overrides for known plugin parameters; unknown keys are ignored
    fn set_params(&mut self, params: &Map<String, Value>) -> Result<()>;

    /// Current plugin parameters, used as plugin defaults in config merging
    fn plugin_params(&self) -> Map<String, Value>;

    fn is_configured(&self) -> bool {
        self.network().is_ok()
    }

    /// Realized input width
    fn input_dim(&self) -> Result<usize> {
        Ok(self.network()?.input_dim())
    }

    /// Realized output width, which may differ from the requested size
    fn output_dim(&self) -> Result<usize> {
        Ok(self.network()?.output_dim())
    }

    /// Fit towards `target`. An encoder whose output is narrower than the
    /// target is trained through a temporary linear readout.
    fn train(
        &mut self,
        input: &Array2<f64>,
        target: &Array2<f64>,
        options: &TrainOptions,
    ) -> Result<TrainingHistory> {
        let trainer = Trainer::new(options.clone());
        trainer.fit_with_head(self.network_mut()?, input, target)
    }

    fn transform(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        self.network()?.predict(input)
    }

    fn score_reconstruction<S1, S2, D>(
        &self,
        original: &ArrayBase<S1, D>,
        reconstructed: &ArrayBase<S2, D>,
    ) -> Result<ReconstructionScore>
    where
        Self: Sized,
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
    {
        score_reconstruction(original, reconstructed)
    }
}

/// On-disk model format
#[derive(Debug, Serialize, Deserialize)]
struct SavedTransform<P> {
    plugin: String,
    role: TransformRole,
    params: P,
    network: Network,
}

fn save_transform<P: Serialize>(
    path: &str,
    plugin: &str,
    role: TransformRole,
    params: &P,
    network: &Network,
) -> Result<()> {
    let saved = SavedTransform {
        plugin: plugin.to_string(),
        role,
        params,
        network: network.clone(),
    };
    let json = serde_json::to_string_pretty(&saved)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn load_transform<P: DeserializeOwned>(
    path: &str,
    plugin: &str,
    role: TransformRole,
) -> Result<(P, Network)> {
    let json = std::fs::read_to_string(path)?;
    let saved: SavedTransform<P> = serde_json::from_str(&json)?;
    if saved.plugin != plugin || saved.role != role {
        return Err(ExtractorError::ConfigError(format!(
            "'{}' holds a {} {} model, expected a {} {} model",
            path, saved.plugin, saved.role, plugin, role
        )));
    }
    Ok((saved.params, saved.network))
}

/// Overlay known keys from `overrides` onto `current`
fn merge_params<P>(current: &P, overrides: &Map<String, Value>) -> Result<P>
where
    P: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(current)?;
    if let Value::Object(map) = &mut value {
        for (key, v) in overrides {
            if map.contains_key(key) {
                map.insert(key.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(value).map_err(|e| {
        ExtractorError::ConfigError(format!("invalid plugin parameters: {}", e))
    })
}

fn params_map<P: Serialize>(params: &P) -> Map<String, Value> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn not_configured(plugin: &str, role: TransformRole) -> ExtractorError {
    ExtractorError::NotConfigured(format!(
        "{} {} used before configure_size",
        plugin, role
    ))
}

fn check_dims(input_dim: usize, output_dim: usize) -> Result<()> {
    if input_dim == 0 {
        return Err(ExtractorError::invalid_parameter("input_dim", 0, "must be positive"));
    }
    if output_dim == 0 {
        return Err(ExtractorError::invalid_parameter("output_dim", 0, "must be positive"));
    }
    Ok(())
}
