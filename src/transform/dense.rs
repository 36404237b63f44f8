//! Fully connected transform

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    check_dims, load_transform, merge_params, not_configured, params_map, save_transform,
    SizeHints, TrainableTransform, TransformRole,
};
use crate::error::Result;
use crate::training::{Activation, DenseLayer, Layer, Network};

/// Dense transform parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseParams {
    /// Hidden layers between input and output
    pub intermediate_layers: usize,
    /// Activation of hidden layers
    pub activation: Activation,
    /// Activation of the final layer
    pub output_activation: Activation,
}

impl Default for DenseParams {
    fn default() -> Self {
        Self {
            intermediate_layers: 1,
            activation: Activation::ReLU,
            output_activation: Activation::Linear,
        }
    }
}

impl DenseParams {
    /// Layer widths from `input_dim` to `output_dim`, hidden widths
    /// interpolated linearly between the two.
    pub fn layer_widths(&self, input_dim: usize, output_dim: usize) -> Vec<usize> {
        let steps = self.intermediate_layers + 1;
        let mut widths = Vec::with_capacity(steps + 1);
        widths.push(input_dim);
        for i in 1..steps {
            let t = i as f64 / steps as f64;
            let w = input_dim as f64 + (output_dim as f64 - input_dim as f64) * t;
            widths.push((w.round() as usize).max(1));
        }
        widths.push(output_dim);
        widths
    }
}

/// Stack of dense layers mapping `input_dim -> output_dim`
#[derive(Debug, Clone)]
pub struct DenseTransform {
    name: String,
    role: TransformRole,
    params: DenseParams,
    network: Option<Network>,
}

impl DenseTransform {
    pub fn new(name: impl Into<String>, role: TransformRole) -> Self {
        Self {
            name: name.into(),
            role,
            params: DenseParams::default(),
            network: None,
        }
    }

    pub fn encoder() -> Self {
        Self::new("default", TransformRole::Encoder)
    }

    pub fn decoder() -> Self {
        Self::new("default", TransformRole::Decoder)
    }

    pub fn params(&self) -> &DenseParams {
        &self.params
    }
}

impl TrainableTransform for DenseTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> TransformRole {
        self.role
    }

    fn configure_size(
        &mut self,
        input_dim: usize,
        output_dim: usize,
        hints: &SizeHints,
    ) -> Result<()> {
        check_dims(input_dim, output_dim)?;
        let mut rng = match hints.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let widths = self.params.layer_widths(input_dim, output_dim);
        let last = widths.len() - 2;
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i == last {
                    self.params.output_activation
                } else {
                    self.params.activation
                };
                Layer::Dense(DenseLayer::new(pair[0], pair[1], activation, &mut rng))
            })
            .collect();

        let network = Network::new(layers)?;
        debug!(
            plugin = %self.name,
            role = %self.role,
            widths = ?widths,
            params = network.num_params(),
            "configured dense transform"
        );
        self.network = Some(network);
        Ok(())
    }

    fn network(&self) -> Result<&Network> {
        self.network
            .as_ref()
            .ok_or_else(|| not_configured(&self.name, self.role))
    }

    fn network_mut(&mut self) -> Result<&mut Network> {
        let (name, role) = (&self.name, self.role);
        self.network
            .as_mut()
            .ok_or_else(|| not_configured(name, role))
    }

    fn save(&self, path: &str) -> Result<()> {
        save_transform(path, &self.name, self.role, &self.params, self.network()?)
    }

    fn load(&mut self, path: &str) -> Result<()> {
        let (params, network) = load_transform(path, &self.name, self.role)?;
        self.params = params;
        self.network = Some(network);
        Ok(())
    }

    fn set_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        self.params = merge_params(&self.params, params)?;
        Ok(())
    }

    fn plugin_params(&self) -> Map<String, Value> {
        params_map(&self.params)
    }
}
