//! Feature Extractor - autoencoder features for time series
//!
//! This crate compresses time series into latent features with an
//! encoder/decoder pair and searches for the smallest interface size that
//! reconstructs the data within an error threshold.
//!
//! # Modules
//!
//! ## Core
//! - [`transform`] - Trainable encoder and decoder transforms
//! - [`plugins`] - Named transform factories
//! - [`autoencoder`] - Encoder/decoder assembly, training and evaluation
//! - [`search`] - Adaptive interface size search
//! - [`training`] - Layers, losses, optimizer and the training loop
//!
//! ## Data
//! - [`timeseries`] - Series container and sliding windows
//! - [`information`] - Dataset information estimate
//! - [`utils`] - CSV loading and saving
//!
//! ## Services
//! - [`config`] - Layered run configuration
//! - [`pipeline`] - End-to-end feature extraction
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod training;
pub mod transform;
pub mod plugins;
pub mod autoencoder;
pub mod search;

// Data
pub mod timeseries;
pub mod information;
pub mod utils;

// Services
pub mod config;
pub mod pipeline;
pub mod cli;

pub use error::{ExtractorError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ExtractorError, Result};

    // Transforms and plugins
    pub use crate::transform::{ConvTransform, DenseTransform, SizeHints, TrainOptions, TrainableTransform};
    pub use crate::plugins::PluginRegistry;

    // Autoencoder
    pub use crate::autoencoder::{AutoencoderManager, TrainingMode};

    // Search
    pub use crate::search::{AutoencoderTrial, InterfaceSizeSearch, SearchConfig, SearchMode, SearchState};

    // Training
    pub use crate::training::{ErrorMetric, LossKind, ReconstructionScore, TrainerConfig};

    // Time series
    pub use crate::timeseries::{make_windows, unwindow, Reconstruction, TimeSeries};

    // Information
    pub use crate::information::{estimate_information, DatasetInformation, Periodicity};

    // Configuration and pipeline
    pub use crate::config::{ConfigMerger, ExtractorConfig};
    pub use crate::pipeline::{FeatureExtractor, PipelineReport};
}
