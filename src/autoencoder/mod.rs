//! Autoencoder coordinator
//!
//! Owns one encoder and one decoder and composes them into a single
//! reconstruction pipeline. Data may be given as 2-D `(samples, features)`
//! or 3-D `(samples, length, channels)`; both are flattened to rows before
//! they reach the transforms.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayBase, Data, Dimension, Ix2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ExtractorError, Result};
use crate::training::{score_reconstruction, ReconstructionScore, Trainer, TrainingHistory};
use crate::transform::{SizeHints, TrainOptions, TrainableTransform};

/// How encoder and decoder are optimised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// One loss, one loop, gradients flow through decoder into encoder
    #[default]
    Joint,
    /// Encoder first through a temporary readout, then decoder on its codes
    TwoStage,
}

impl FromStr for TrainingMode {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "joint" => Ok(TrainingMode::Joint),
            "two_stage" | "twostage" => Ok(TrainingMode::TwoStage),
            other => Err(ExtractorError::invalid_parameter(
                "training_mode",
                other,
                "expected 'joint' or 'two_stage'",
            )),
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingMode::Joint => write!(f, "joint"),
            TrainingMode::TwoStage => write!(f, "two_stage"),
        }
    }
}

/// Flatten 2-D or 3-D data into `(samples, features)` rows.
///
/// 2-D input is read as `(samples, length)` with one trailing channel, which
/// flattens to itself.
pub fn to_rows<S, D>(data: &ArrayBase<S, D>) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let view = data.view().into_dyn();
    let shape = view.shape().to_vec();
    match shape.as_slice() {
        [_, _] => Ok(view.into_dimensionality::<Ix2>()?.to_owned()),
        &[samples, len, channels] => {
            let owned = view.as_standard_layout().into_owned();
            Ok(owned.into_shape_with_order((samples, len * channels))?)
        }
        _ => Err(ExtractorError::UnsupportedDataShape { ndim: shape.len() }),
    }
}

fn check_finite(rows: &Array2<f64>) -> Result<()> {
    let bad = rows.iter().filter(|v| !v.is_finite()).count();
    if bad > 0 {
        return Err(ExtractorError::InvalidData(format!(
            "{} NaN or infinite values in data of shape {:?}",
            bad,
            rows.shape()
        )));
    }
    Ok(())
}

/// Encoder/decoder pair trained as one reconstruction pipeline
#[derive(Debug)]
pub struct AutoencoderManager {
    encoder: Box<dyn TrainableTransform>,
    decoder: Box<dyn TrainableTransform>,
    options: TrainOptions,
    mode: TrainingMode,
    interface_size: Option<usize>,
}

impl AutoencoderManager {
    pub fn new(
        encoder: Box<dyn TrainableTransform>,
        decoder: Box<dyn TrainableTransform>,
        options: TrainOptions,
        mode: TrainingMode,
    ) -> Self {
        Self {
            encoder,
            decoder,
            options,
            mode,
            interface_size: None,
        }
    }

    pub fn encoder(&self) -> &dyn TrainableTransform {
        self.encoder.as_ref()
    }

    pub fn decoder(&self) -> &dyn TrainableTransform {
        self.decoder.as_ref()
    }

    pub fn mode(&self) -> TrainingMode {
        self.mode
    }

    pub fn options(&self) -> &TrainOptions {
        &self.options
    }

    /// Interface size requested at the last `build`
    pub fn interface_size(&self) -> Option<usize> {
        self.interface_size
    }

    /// Latent width produced by the encoder
    pub fn latent_dim(&self) -> Result<usize> {
        self.encoder.output_dim()
    }

    pub fn input_dim(&self) -> Result<usize> {
        self.encoder.input_dim()
    }

    /// Size the encoder for `input_dim -> interface_size`, then the decoder
    /// from the encoder's realized output width back to `input_dim`.
    pub fn build(&mut self, input_dim: usize, interface_size: usize, num_channels: usize) -> Result<()> {
        let seed = self.options.random_state;
        let hints = SizeHints::new(num_channels, interface_size);

        self.encoder
            .configure_size(input_dim, interface_size, &hints.with_seed(seed))?;
        let latent_dim = self.encoder.output_dim()?;
        self.decoder.configure_size(
            latent_dim,
            input_dim,
            &hints.with_seed(seed.map(|s| s.wrapping_add(1))),
        )?;
        self.interface_size = Some(interface_size);

        debug!(
            input_dim,
            interface_size,
            latent_dim,
            num_channels,
            encoder = self.encoder.name(),
            decoder = self.decoder.name(),
            "built autoencoder"
        );
        Ok(())
    }

    /// Train the pipeline to reconstruct `data` from itself
    pub fn train<S, D>(&mut self, data: &ArrayBase<S, D>) -> Result<TrainingHistory>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let rows = self.prepare(data)?;

        let history = match self.mode {
            TrainingMode::Joint => {
                let trainer = Trainer::new(self.options.clone());
                let encoder = self.encoder.network_mut()?;
                let decoder = self.decoder.network_mut()?;
                trainer.fit(&mut [encoder, decoder], &rows, &rows)?
            }
            TrainingMode::TwoStage => {
                let encoder_history = self.encoder.train(&rows, &rows, &self.options)?;
                debug!(
                    epochs = encoder_history.epochs_run(),
                    best_loss = encoder_history.best_loss,
                    "encoder stage finished"
                );
                let latent = self.encoder.transform(&rows)?;
                self.decoder.train(&latent, &rows, &self.options)?
            }
        };

        info!(
            mode = %self.mode,
            epochs = history.epochs_run(),
            final_loss = history.final_loss().unwrap_or(f64::NAN),
            best_loss = history.best_loss,
            best_epoch = history.best_epoch + 1,
            stopped_early = history.stopped_early,
            "autoencoder training finished"
        );
        debug!(losses = ?history.losses, "loss trajectory");
        Ok(history)
    }

    /// Reconstruction error on `data`
    pub fn evaluate<S, D>(&self, data: &ArrayBase<S, D>) -> Result<ReconstructionScore>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let rows = self.prepare(data)?;
        let reconstructed = self.decoder.transform(&self.encoder.transform(&rows)?)?;
        score_reconstruction(&rows, &reconstructed)
    }

    pub fn encode<S, D>(&self, data: &ArrayBase<S, D>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let rows = self.prepare(data)?;
        self.encoder.transform(&rows)
    }

    pub fn decode<S, D>(&self, latent: &ArrayBase<S, D>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let rows = to_rows(latent)?;
        check_finite(&rows)?;
        self.decoder.transform(&rows)
    }

    /// Encode then decode, returning flattened rows
    pub fn reconstruct<S, D>(&self, data: &ArrayBase<S, D>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let latent = self.encode(data)?;
        self.decoder.transform(&latent)
    }

    pub fn save_encoder(&self, path: &str) -> Result<()> {
        self.encoder.save(path)?;
        info!(path, "saved encoder");
        Ok(())
    }

    pub fn save_decoder(&self, path: &str) -> Result<()> {
        self.decoder.save(path)?;
        info!(path, "saved decoder");
        Ok(())
    }

    pub fn load_encoder(&mut self, path: &str) -> Result<()> {
        self.encoder.load(path)?;
        info!(path, "loaded encoder");
        Ok(())
    }

    pub fn load_decoder(&mut self, path: &str) -> Result<()> {
        self.decoder.load(path)?;
        info!(path, "loaded decoder");
        Ok(())
    }

    fn prepare<S, D>(&self, data: &ArrayBase<S, D>) -> Result<Array2<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let rows = to_rows(data)?;
        check_finite(&rows)?;
        let expected = self.encoder.input_dim()?;
        if rows.ncols() != expected {
            return Err(ExtractorError::ShapeMismatch {
                expected: format!("(n, {})", expected),
                actual: format!("{:?}", data.shape()),
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TrainerConfig;
    use crate::transform::{ConvTransform, DenseTransform};
    use ndarray::{Array1, Array3, Array4};

    fn options(epochs: usize) -> TrainOptions {
        TrainerConfig {
            epochs,
            batch_size: 8,
            learning_rate: 0.01,
            ..Default::default()
        }
    }

    fn dense_manager(mode: TrainingMode) -> AutoencoderManager {
        AutoencoderManager::new(
            Box::new(DenseTransform::encoder()),
            Box::new(DenseTransform::decoder()),
            options(20),
            mode,
        )
    }

    fn windows() -> Array2<f64> {
        Array2::from_shape_fn((32, 8), |(i, j)| ((i + j) as f64 * 0.4).sin() * 0.5 + 0.5)
    }

    #[test]
    fn test_to_rows_shapes() {
        let three = Array3::from_shape_fn((2, 3, 2), |(i, j, k)| (i * 6 + j * 2 + k) as f64);
        let rows = to_rows(&three).unwrap();
        assert_eq!(rows.dim(), (2, 6));
        assert_eq!(rows[[1, 0]], 6.0);

        let one = Array1::<f64>::zeros(4);
        assert!(matches!(
            to_rows(&one),
            Err(ExtractorError::UnsupportedDataShape { ndim: 1 })
        ));
        let four = Array4::<f64>::zeros((1, 1, 1, 1));
        assert!(matches!(
            to_rows(&four),
            Err(ExtractorError::UnsupportedDataShape { ndim: 4 })
        ));
    }

    #[test]
    fn test_train_before_build_fails() {
        let mut manager = dense_manager(TrainingMode::Joint);
        assert!(matches!(
            manager.train(&windows()),
            Err(ExtractorError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_joint_training_improves_reconstruction() {
        let data = windows();
        let mut manager = dense_manager(TrainingMode::Joint);
        manager.build(8, 4, 1).unwrap();

        let before = manager.evaluate(&data).unwrap();
        let history = manager.train(&data).unwrap();
        let after = manager.evaluate(&data).unwrap();

        assert!(!history.losses.is_empty());
        assert!(after.mse < before.mse);
        assert_eq!(manager.encode(&data).unwrap().dim(), (32, 4));
        assert_eq!(manager.reconstruct(&data).unwrap().dim(), (32, 8));
    }

    #[test]
    fn test_two_stage_training() {
        let data = windows();
        let mut manager = dense_manager(TrainingMode::TwoStage);
        manager.build(8, 2, 1).unwrap();
        manager.train(&data).unwrap();
        let score = manager.evaluate(&data).unwrap();
        assert!(score.mse.is_finite());
    }

    #[test]
    fn test_nan_rejected() {
        let mut data = windows();
        data[[3, 2]] = f64::NAN;
        let mut manager = dense_manager(TrainingMode::Joint);
        manager.build(8, 4, 1).unwrap();
        assert!(matches!(
            manager.train(&data),
            Err(ExtractorError::InvalidData(_))
        ));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let mut manager = dense_manager(TrainingMode::Joint);
        manager.build(8, 4, 1).unwrap();
        assert!(matches!(
            manager.evaluate(&Array2::<f64>::zeros((4, 6))),
            Err(ExtractorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_conv_decoder_follows_realized_latent() {
        let data = Array3::from_shape_fn((16, 10, 1), |(i, j, _)| ((i + j) % 5) as f64 / 5.0);
        let mut manager = AutoencoderManager::new(
            Box::new(ConvTransform::encoder()),
            Box::new(ConvTransform::decoder()),
            options(2),
            TrainingMode::Joint,
        );
        manager.build(10, 3, 1).unwrap();
        assert_eq!(manager.interface_size(), Some(3));
        assert_eq!(manager.latent_dim().unwrap(), 4);

        manager.train(&data).unwrap();
        let latent = manager.encode(&data).unwrap();
        assert_eq!(manager.decode(&latent).unwrap().dim(), (16, 10));
    }

    #[test]
    fn test_save_and_load_models() {
        let dir = tempfile::tempdir().unwrap();
        let enc_path = dir.path().join("enc.json");
        let dec_path = dir.path().join("dec.json");
        let (enc_path, dec_path) = (enc_path.to_str().unwrap(), dec_path.to_str().unwrap());

        let data = windows();
        let mut manager = dense_manager(TrainingMode::Joint);
        manager.build(8, 4, 1).unwrap();
        manager.train(&data).unwrap();
        manager.save_encoder(enc_path).unwrap();
        manager.save_decoder(dec_path).unwrap();

        let mut loaded = dense_manager(TrainingMode::Joint);
        loaded.load_encoder(enc_path).unwrap();
        loaded.load_decoder(dec_path).unwrap();

        let a = manager.evaluate(&data).unwrap();
        let b = loaded.evaluate(&data).unwrap();
        assert!((a.mse - b.mse).abs() < 1e-9);
    }

    #[test]
    fn test_training_mode_parse() {
        assert_eq!("two-stage".parse::<TrainingMode>().unwrap(), TrainingMode::TwoStage);
        assert_eq!(TrainingMode::Joint.to_string(), "joint");
        assert!("parallel".parse::<TrainingMode>().is_err());
    }
}
