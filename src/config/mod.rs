//! Run configuration
//!
//! A single flat record of options, assembled once before a run from four
//! layers with later layers winning:
//! defaults < config file < plugin defaults < command line.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ExtractorError, Result};
use crate::information::Periodicity;
use crate::search::SearchConfig;
use crate::transform::TrainOptions;

pub use crate::autoencoder::TrainingMode;
pub use crate::search::SearchMode;
pub use crate::training::{ErrorMetric, LossKind};

/// Feature extractor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Input CSV file
    pub csv_file: String,
    /// Whether the CSV has a header row
    pub headers: bool,
    /// Keep the date column in reconstructed output
    pub force_date: bool,

    pub window_size: usize,
    /// Window each column; otherwise train on rows of all columns
    pub use_sliding_windows: bool,

    pub initial_size: usize,
    pub step_size: usize,
    pub threshold_error: f64,
    pub search_mode: SearchMode,
    pub error_metric: ErrorMetric,
    pub max_iterations: Option<usize>,
    pub max_search_secs: Option<u64>,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Early stopping patience in epochs, 0 disables
    pub patience: usize,
    pub loss: LossKind,
    pub training_mode: TrainingMode,

    /// Sampling period label used by the information estimate
    pub dataset_periodicity: String,

    pub encoder_plugin: String,
    pub decoder_plugin: String,
    /// Prefix of saved encoder files
    pub save_encoder: String,
    /// Prefix of saved decoder files
    pub save_decoder: String,
    pub load_encoder: Option<String>,
    pub load_decoder: Option<String>,
    /// Prefix of latent code CSV files
    pub evaluate_encoder: Option<String>,
    /// Prefix of decoded window CSV files
    pub evaluate_decoder: Option<String>,
    /// Prefix of reconstructed series CSV files
    pub csv_output_path: String,

    pub load_config: Option<String>,
    pub save_config: Option<String>,
    pub quiet_mode: bool,
    pub seed: Option<u64>,

    /// Plugin specific parameters
    #[serde(flatten)]
    pub plugin_params: Map<String, Value>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            csv_file: "./csv_input.csv".to_string(),
            headers: false,
            force_date: false,
            window_size: 512,
            use_sliding_windows: true,
            initial_size: 8,
            step_size: 4,
            threshold_error: 0.005,
            search_mode: SearchMode::Grow,
            error_metric: ErrorMetric::Mse,
            max_iterations: None,
            max_search_secs: None,
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.001,
            patience: 3,
            loss: LossKind::Mse,
            training_mode: TrainingMode::Joint,
            dataset_periodicity: "1h".to_string(),
            encoder_plugin: "default".to_string(),
            decoder_plugin: "default".to_string(),
            save_encoder: "./encoder_model".to_string(),
            save_decoder: "./decoder_model".to_string(),
            load_encoder: None,
            load_decoder: None,
            evaluate_encoder: None,
            evaluate_decoder: None,
            csv_output_path: "./reconstructed".to_string(),
            load_config: None,
            save_config: None,
            quiet_mode: false,
            seed: Some(42),
            plugin_params: Map::new(),
        }
    }
}

impl ExtractorConfig {
    /// Reject settings that cannot run before any work starts
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("window_size", self.window_size),
            ("initial_size", self.initial_size),
            ("step_size", self.step_size),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ExtractorError::invalid_parameter(name, value, "must be positive"));
            }
        }
        if !(self.threshold_error.is_finite() && self.threshold_error > 0.0) {
            return Err(ExtractorError::invalid_parameter(
                "threshold_error",
                self.threshold_error,
                "must be a positive number",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ExtractorError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be a positive number",
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(ExtractorError::invalid_parameter("max_iterations", 0, "must be positive"));
        }
        if self.load_encoder.is_some() != self.load_decoder.is_some() {
            return Err(ExtractorError::ConfigError(
                "load_encoder and load_decoder must be given together".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed periodicity, `None` for an unknown label
    pub fn periodicity(&self) -> Option<Periodicity> {
        self.dataset_periodicity.parse().ok()
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            initial_size: self.initial_size,
            step_size: self.step_size,
            threshold_error: self.threshold_error,
            mode: self.search_mode,
            error_metric: self.error_metric,
            max_iterations: self.max_iterations,
            max_duration: self.max_search_secs.map(Duration::from_secs),
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            patience: self.patience,
            loss: self.loss,
            random_state: self.seed,
        }
    }

    /// Whether both halves of a pre-trained model are given
    pub fn uses_pretrained(&self) -> bool {
        self.load_encoder.is_some() && self.load_decoder.is_some()
    }
}

/// Layered configuration merge
#[derive(Debug, Clone, Default)]
pub struct ConfigMerger {
    file: Map<String, Value>,
    plugin: Map<String, Value>,
    cli: Map<String, Value>,
}

impl ConfigMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values read from a config file
    pub fn with_file(mut self, values: Map<String, Value>) -> Self {
        self.file = values;
        self
    }

    /// Defaults declared by the selected plugins
    pub fn with_plugin_params(mut self, values: Map<String, Value>) -> Self {
        self.plugin.extend(values);
        self
    }

    /// Values given explicitly on the command line
    pub fn with_cli(mut self, values: Map<String, Value>) -> Self {
        self.cli = values;
        self
    }

    /// Overlay every layer on the defaults and deserialize the result
    pub fn merge(&self) -> Result<ExtractorConfig> {
        let mut merged = defaults_map()?;
        for layer in [&self.file, &self.plugin, &self.cli] {
            for (key, value) in layer {
                merged.insert(key.clone(), value.clone());
            }
        }
        debug!(keys = merged.len(), "merged configuration");
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| ExtractorError::ConfigError(format!("invalid configuration: {}", e)))
    }
}

fn defaults_map() -> Result<Map<String, Value>> {
    match serde_json::to_value(ExtractorConfig::default())? {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractorError::ConfigError(
            "default configuration is not an object".to_string(),
        )),
    }
}

/// Read a JSON config file as a flat object
pub fn load_config(path: &str) -> Result<Map<String, Value>> {
    let json = std::fs::read_to_string(path)?;
    match serde_json::from_str(&json)? {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractorError::ConfigError(format!(
            "'{}' does not contain a JSON object",
            path
        ))),
    }
}

/// Write the values of `config` that differ from the defaults
pub fn save_config(config: &ExtractorConfig, path: &str) -> Result<()> {
    let defaults = defaults_map()?;
    let current = match serde_json::to_value(config)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let changed: Map<String, Value> = current
        .into_iter()
        .filter(|(key, value)| defaults.get(key) != Some(value))
        .collect();

    let json = serde_json::to_string_pretty(&Value::Object(changed))?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ExtractorConfig::default();
        assert_eq!(config.window_size, 512);
        assert_eq!(config.initial_size, 8);
        assert_eq!(config.step_size, 4);
        assert_eq!(config.threshold_error, 0.005);
        assert!(config.use_sliding_windows);
        assert!(!config.headers);
        assert_eq!(config.periodicity(), Some(Periodicity::Hourly));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_precedence() {
        let merged = ConfigMerger::new()
            .with_file(object(json!({"window_size": 64, "epochs": 5, "filters": 8})))
            .with_plugin_params(object(json!({"filters": 16, "kernel_size": 3})))
            .with_cli(object(json!({"epochs": 7, "kernel_size": 5})))
            .merge()
            .unwrap();

        assert_eq!(merged.window_size, 64);
        assert_eq!(merged.epochs, 7);
        assert_eq!(merged.plugin_params.get("filters"), Some(&json!(16)));
        assert_eq!(merged.plugin_params.get("kernel_size"), Some(&json!(5)));
        assert_eq!(merged.batch_size, 32);
    }

    #[test]
    fn test_merge_parses_enums() {
        let merged = ConfigMerger::new()
            .with_cli(object(json!({"search_mode": "shrink", "loss": "huber", "training_mode": "two_stage"})))
            .merge()
            .unwrap();
        assert_eq!(merged.search_mode, SearchMode::Shrink);
        assert_eq!(merged.loss, LossKind::Huber);
        assert_eq!(merged.training_mode, TrainingMode::TwoStage);

        let bad = ConfigMerger::new()
            .with_cli(object(json!({"window_size": "wide"})))
            .merge();
        assert!(matches!(bad, Err(ExtractorError::ConfigError(_))));
    }

    #[test]
    fn test_save_config_writes_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_out.json");
        let path = path.to_str().unwrap();

        let mut config = ExtractorConfig::default();
        config.window_size = 32;
        config.plugin_params.insert("filters".to_string(), json!(4));
        save_config(&config, path).unwrap();

        let saved = load_config(path).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.get("window_size"), Some(&json!(32)));

        let reloaded = ConfigMerger::new().with_file(saved).merge().unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ExtractorConfig::default();
        config.step_size = 0;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.threshold_error = -1.0;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.load_encoder = Some("enc.json".to_string());
        assert!(matches!(config.validate(), Err(ExtractorError::ConfigError(_))));
    }

    #[test]
    fn test_derived_settings() {
        let mut config = ExtractorConfig::default();
        config.max_search_secs = Some(30);
        config.dataset_periodicity = "2h".to_string();

        let search = config.search_config();
        assert_eq!(search.max_duration, Some(Duration::from_secs(30)));
        assert_eq!(config.train_options().random_state, Some(42));
        assert_eq!(config.periodicity(), None);
    }
}
