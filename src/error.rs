//! Error types for the feature extractor

use thiserror::Error;

/// Result type alias for feature extractor operations
pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Main error type for the feature extractor
#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Invalid window size {window_size} for series of length {series_len}")]
    InvalidWindowSize { window_size: usize, series_len: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Transform not configured: {0}")]
    NotConfigured(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Unsupported data shape: expected 2-D or 3-D data, got {ndim}-D")]
    UnsupportedDataShape { ndim: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Plugin not found: {kind} plugin '{name}'")]
    PluginNotFound { kind: String, name: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ExtractorError {
    /// Build a shape mismatch from two shape slices
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        ExtractorError::ShapeMismatch {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Build an invalid parameter error
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ExtractorError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for ExtractorError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExtractorError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(err: serde_json::Error) -> Self {
        ExtractorError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ExtractorError {
    fn from(err: ndarray::ShapeError) -> Self {
        ExtractorError::ShapeMismatch {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
