//! Convolutional transform
//!
//! The encoder runs a strided 1-D convolution over the window and reads the
//! feature maps out into a latent sequence of `latent_channels` channels. The
//! latent width is therefore rounded up to a whole number of time steps, and a
//! decoder must be sized from the encoder's realized output width.
//!
//! The decoder expands the latent code, upsamples along the length axis until
//! it covers the window, smooths with a convolution and projects to the
//! output width.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    check_dims, load_transform, merge_params, not_configured, params_map, save_transform,
    SizeHints, TrainableTransform, TransformRole,
};
use crate::error::{ExtractorError, Result};
use crate::training::{Activation, Conv1dLayer, DenseLayer, Layer, Network, Upsample1dLayer};

/// Convolutional transform parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvParams {
    pub filters: usize,
    pub kernel_size: usize,
    /// Encoder convolution stride
    pub stride: usize,
    /// Channels of the latent sequence
    pub latent_channels: usize,
    /// Decoder upsampling factor per stage
    pub upsample_factor: usize,
    pub activation: Activation,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            filters: 16,
            kernel_size: 3,
            stride: 2,
            latent_channels: 4,
            upsample_factor: 2,
            activation: Activation::ReLU,
        }
    }
}

impl ConvParams {
    /// Latent width actually produced for a requested interface size
    pub fn realized_latent_dim(&self, interface_size: usize) -> usize {
        let channels = self.latent_channels.max(1);
        interface_size.div_ceil(channels) * channels
    }
}

/// Convolutional encoder or decoder
#[derive(Debug, Clone)]
pub struct ConvTransform {
    name: String,
    role: TransformRole,
    params: ConvParams,
    network: Option<Network>,
}

impl ConvTransform {
    pub fn new(name: impl Into<String>, role: TransformRole) -> Self {
        Self {
            name: name.into(),
            role,
            params: ConvParams::default(),
            network: None,
        }
    }

    pub fn encoder() -> Self {
        Self::new("cnn", TransformRole::Encoder)
    }

    pub fn decoder() -> Self {
        Self::new("cnn", TransformRole::Decoder)
    }

    pub fn params(&self) -> &ConvParams {
        &self.params
    }

    fn build_encoder(
        &self,
        input_dim: usize,
        output_dim: usize,
        channels: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Vec<Layer>> {
        let in_len = sequence_len(input_dim, channels)?;
        let conv = Conv1dLayer::new(
            in_len,
            channels,
            self.params.filters,
            self.params.kernel_size.min(in_len),
            self.params.stride.max(1),
            self.params.activation,
            rng,
        )?;
        let conv_width = conv.out_len() * conv.filters();
        let latent_dim = self.params.realized_latent_dim(output_dim);

        Ok(vec![
            Layer::Conv1d(conv),
            Layer::Dense(DenseLayer::new(conv_width, latent_dim, Activation::Linear, rng)),
        ])
    }

    fn build_decoder(
        &self,
        input_dim: usize,
        output_dim: usize,
        channels: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Vec<Layer>> {
        let out_len = sequence_len(output_dim, channels)?;
        let filters = self.params.filters.max(1);
        let factor = self.params.upsample_factor.max(1);

        let mut len = input_dim
            .div_ceil(self.params.latent_channels.max(1))
            .clamp(1, out_len);
        let mut layers = vec![Layer::Dense(DenseLayer::new(
            input_dim,
            len * filters,
            self.params.activation,
            rng,
        ))];

        while factor > 1 && len < out_len {
            layers.push(Layer::Upsample1d(Upsample1dLayer::new(len, filters, factor)));
            len *= factor;
        }

        let conv = Conv1dLayer::new(
            len,
            filters,
            channels,
            self.params.kernel_size.min(len),
            1,
            self.params.activation,
            rng,
        )?;
        let conv_width = conv.out_len() * conv.filters();
        layers.push(Layer::Conv1d(conv));
        layers.push(Layer::Dense(DenseLayer::new(
            conv_width,
            output_dim,
            Activation::Linear,
            rng,
        )));
        Ok(layers)
    }
}

fn sequence_len(dim: usize, channels: usize) -> Result<usize> {
    if dim % channels != 0 {
        return Err(ExtractorError::ShapeMismatch {
            expected: format!("a width divisible by {} channels", channels),
            actual: format!("width {}", dim),
        });
    }
    Ok(dim / channels)
}

impl TrainableTransform for ConvTransform {
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
        let channels = hints.num_channels.max(1);

        let layers = match self.role {
            TransformRole::Encoder => self.build_encoder(input_dim, output_dim, channels, &mut rng)?,
            TransformRole::Decoder => self.build_decoder(input_dim, output_dim, channels, &mut rng)?,
        };
        let network = Network::new(layers)?;
        debug!(
            plugin = %self.name,
            role = %self.role,
            input_dim = network.input_dim(),
            output_dim = network.output_dim(),
            layers = network.layers().len(),
            params = network.num_params(),
            "configured convolutional transform"
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
