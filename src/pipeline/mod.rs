//! End-to-end feature extraction
//!
//! For every column (or for all columns at once in row mode): window the
//! data, search the interface size, reconstruct, score against the original
//! series and write the reconstruction. Models are persisted once, after
//! every unit has finished.

use std::time::Instant;

use ndarray::{Array2, ArrayView2, Axis};
use serde::Serialize;
use tracing::{info, warn};

use crate::autoencoder::AutoencoderManager;
use crate::config::{save_config, ExtractorConfig};
use crate::error::{ExtractorError, Result};
use crate::information::{estimate_information, DatasetInformation};
use crate::plugins::PluginRegistry;
use crate::search::{AutoencoderTrial, InterfaceSizeSearch, SearchIteration, SearchState};
use crate::timeseries::{make_windows, unwindow, Reconstruction, TimeSeries};
use crate::training::{score_reconstruction, ReconstructionScore};
use crate::utils::{DataLoader, DataSaver};

/// Unit name used for model files in row mode
pub const ROW_MODE_UNIT: &str = "all";

/// Result for one input column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub column: String,
    /// Search outcome, `None` when pre-trained models were used
    pub state: Option<SearchState>,
    pub interface_size: usize,
    /// Latent width realized by the encoder
    pub latent_dim: usize,
    /// Score on the training samples (windows or rows)
    pub training_score: ReconstructionScore,
    /// Score of the reconstructed series against the original column
    pub reconstruction_score: ReconstructionScore,
    pub iterations: Vec<SearchIteration>,
    pub information: Option<DatasetInformation>,
    pub output_file: String,
}

/// Result of a full run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub columns: Vec<ColumnReport>,
    /// Model files written at the end of the run
    pub saved_models: Vec<String>,
    pub elapsed_secs: f64,
}

/// Samples trained together and the columns they reconstruct
struct Unit {
    name: String,
    data: Array2<f64>,
    columns: Vec<String>,
}

struct UnitModel {
    manager: AutoencoderManager,
    state: Option<SearchState>,
    interface_size: usize,
    score: ReconstructionScore,
    iterations: Vec<SearchIteration>,
}

/// Runs the feature extraction pipeline for one configuration
#[derive(Debug)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
    registry: PluginRegistry,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            registry: PluginRegistry::with_builtin(),
        }
    }

    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Load `csv_file` and process it
    pub fn run(&self) -> Result<PipelineReport> {
        self.config.validate()?;
        let series = DataLoader::new().load_csv(&self.config.csv_file, self.config.headers)?;
        self.run_on(&series)
    }

    /// Process an already loaded series
    pub fn run_on(&self, series: &TimeSeries) -> Result<PipelineReport> {
        let started = Instant::now();
        self.config.validate()?;
        series.validate_finite()?;

        let mut reports = Vec::new();
        let mut trained = Vec::new();
        for unit in self.units(series)? {
            info!(unit = %unit.name, samples = unit.data.nrows(), width = unit.data.ncols(), "processing");
            let information = self.information(&unit);
            let model = self.fit_unit(&unit)?;
            reports.extend(self.reconstruct_unit(&unit, &model, series, information)?);
            if model.state.is_some() {
                trained.push((unit.name, model.manager));
            }
        }

        let mut saved_models = Vec::new();
        for (name, manager) in &trained {
            let encoder_path = model_path(&self.config.save_encoder, name);
            let decoder_path = model_path(&self.config.save_decoder, name);
            manager.save_encoder(&encoder_path)?;
            manager.save_decoder(&decoder_path)?;
            saved_models.extend([encoder_path, decoder_path]);
        }

        if let Some(path) = &self.config.save_config {
            save_config(&self.config, path)?;
            info!(path = %path, "saved configuration");
        }

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(columns = reports.len(), elapsed_secs, "feature extraction finished");
        Ok(PipelineReport {
            columns: reports,
            saved_models,
            elapsed_secs,
        })
    }

    fn units(&self, series: &TimeSeries) -> Result<Vec<Unit>> {
        if !self.config.use_sliding_windows {
            return Ok(vec![Unit {
                name: ROW_MODE_UNIT.to_string(),
                data: series.values().to_owned(),
                columns: series.column_names().to_vec(),
            }]);
        }

        series
            .column_names()
            .iter()
            .map(|name| {
                let column = series
                    .column(name)
                    .ok_or_else(|| ExtractorError::DataError(format!("unknown column '{}'", name)))?;
                Ok(Unit {
                    name: name.clone(),
                    data: make_windows(&column, self.config.window_size)?,
                    columns: vec![name.clone()],
                })
            })
            .collect()
    }

    fn information(&self, unit: &Unit) -> Option<DatasetInformation> {
        let periodicity = self.config.periodicity();
        if periodicity.is_none() {
            warn!(periodicity = %self.config.dataset_periodicity, "unknown dataset periodicity");
        }
        let result = if self.config.use_sliding_windows {
            estimate_information(&unit.data.view().insert_axis(Axis(2)), periodicity)
        } else {
            estimate_information(&unit.data, periodicity)
        };

        match result {
            Ok(info) => {
                info!(
                    unit = %unit.name,
                    snr = info.snr,
                    sampling_frequency = info.sampling_frequency,
                    channel_capacity = info.channel_capacity,
                    total_information_bits = info.total_information_bits,
                    entropy = info.entropy,
                    "dataset information"
                );
                Some(info)
            }
            Err(err) => {
                warn!(unit = %unit.name, error = %err, "dataset information estimate failed");
                None
            }
        }
    }

    fn new_trial<'a>(&'a self, unit: &'a Unit) -> AutoencoderTrial<'a> {
        AutoencoderTrial::new(
            &self.registry,
            &unit.data,
            self.config.train_options(),
            self.config.training_mode,
        )
        .with_plugins(&self.config.encoder_plugin, &self.config.decoder_plugin)
        .with_plugin_params(self.config.plugin_params.clone())
    }

    fn fit_unit(&self, unit: &Unit) -> Result<UnitModel> {
        if let (Some(encoder), Some(decoder)) = (&self.config.load_encoder, &self.config.load_decoder) {
            let mut manager = self.new_trial(unit).new_manager()?;
            manager.load_encoder(&model_path(encoder, &unit.name))?;
            manager.load_decoder(&model_path(decoder, &unit.name))?;
            let score = manager.evaluate(&unit.data)?;
            let interface_size = manager.latent_dim()?;
            info!(unit = %unit.name, mse = score.mse, mae = score.mae, "evaluated pre-trained models");
            return Ok(UnitModel {
                manager,
                state: None,
                interface_size,
                score,
                iterations: Vec::new(),
            });
        }

        let mut runner = self.new_trial(unit);
        let outcome = InterfaceSizeSearch::new(self.config.search_config()).run(&mut runner)?;
        Ok(UnitModel {
            manager: outcome.model,
            state: Some(outcome.state),
            interface_size: outcome.interface_size,
            score: outcome.score,
            iterations: outcome.iterations,
        })
    }

    fn reconstruct_unit(
        &self,
        unit: &Unit,
        model: &UnitModel,
        series: &TimeSeries,
        information: Option<DatasetInformation>,
    ) -> Result<Vec<ColumnReport>> {
        let manager = &model.manager;
        let reconstructed = manager.reconstruct(&unit.data)?;

        if let Some(prefix) = &self.config.evaluate_encoder {
            let path = csv_path(prefix, &unit.name);
            DataSaver::write_matrix_csv(&path, "latent", &manager.encode(&unit.data)?, self.config.headers)?;
            info!(path = %path, "wrote latent codes");
        }
        if let Some(prefix) = &self.config.evaluate_decoder {
            let path = csv_path(prefix, &unit.name);
            DataSaver::write_matrix_csv(&path, "decoded", &reconstructed, self.config.headers)?;
            info!(path = %path, "wrote decoded samples");
        }

        let mode = Reconstruction::for_sliding_windows(self.config.use_sliding_windows);
        let timestamps = if self.config.force_date { series.timestamps() } else { None };
        let latent_dim = manager.latent_dim()?;

        unit.columns
            .iter()
            .enumerate()
            .map(|(j, column)| {
                let samples: ArrayView2<f64> = match mode {
                    Reconstruction::Overlapping => reconstructed.view(),
                    Reconstruction::RowWise => reconstructed.column(j).insert_axis(Axis(1)),
                };
                let restored = unwindow(&samples, mode)?;
                let original = series
                    .column(column)
                    .ok_or_else(|| ExtractorError::DataError(format!("unknown column '{}'", column)))?;
                let reconstruction_score = score_reconstruction(&original, &restored)?;

                let output_file = csv_path(&self.config.csv_output_path, column);
                DataSaver::write_series_csv(&output_file, column, &restored, timestamps, self.config.headers)?;
                info!(
                    column = %column,
                    mse = reconstruction_score.mse,
                    mae = reconstruction_score.mae,
                    path = %output_file,
                    "wrote reconstruction"
                );

                Ok(ColumnReport {
                    column: column.clone(),
                    state: model.state,
                    interface_size: model.interface_size,
                    latent_dim,
                    training_score: model.score,
                    reconstruction_score,
                    iterations: model.iterations.clone(),
                    information: information.clone(),
                    output_file,
                })
            })
            .collect()
    }
}

fn model_path(prefix: &str, unit: &str) -> String {
    format!("{}_{}.json", prefix, unit)
}

fn csv_path(prefix: &str, unit: &str) -> String {
    format!("{}_{}.csv", prefix, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMode;

    fn sine_series(len: usize) -> TimeSeries {
        let values = Array2::from_shape_fn((len, 2), |(i, j)| {
            ((i as f64) * 0.3 + j as f64).sin() * 0.5 + 0.5
        });
        TimeSeries::new(vec!["a".to_string(), "b".to_string()], values, None).unwrap()
    }

    fn small_config(dir: &std::path::Path) -> ExtractorConfig {
        let prefix = |name: &str| dir.join(name).to_str().unwrap().to_string();
        ExtractorConfig {
            window_size: 8,
            initial_size: 2,
            step_size: 2,
            threshold_error: 5.0,
            epochs: 5,
            batch_size: 8,
            learning_rate: 0.01,
            save_encoder: prefix("encoder"),
            save_decoder: prefix("decoder"),
            csv_output_path: prefix("reconstructed"),
            ..Default::default()
        }
    }

    #[test]
    fn test_units_per_column_and_row_mode() {
        let dir = tempfile::tempdir().unwrap();
        let series = sine_series(20);
        let mut config = small_config(dir.path());

        let units = FeatureExtractor::new(config.clone()).units(&series).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].data.dim(), (13, 8));

        config.use_sliding_windows = false;
        let units = FeatureExtractor::new(config).units(&series).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, ROW_MODE_UNIT);
        assert_eq!(units[0].data.dim(), (20, 2));
    }

    #[test]
    fn test_run_writes_outputs_and_models() {
        let dir = tempfile::tempdir().unwrap();
        let series = sine_series(30);
        let config = small_config(dir.path());

        let report = FeatureExtractor::new(config).run_on(&series).unwrap();
        assert_eq!(report.columns.len(), 2);
        for column in &report.columns {
            assert_eq!(column.state, Some(SearchState::Converged));
            assert_eq!(column.interface_size, 2);
            assert!(std::path::Path::new(&column.output_file).exists());
            assert!(column.reconstruction_score.mse.is_finite());
        }
        assert_eq!(report.saved_models.len(), 4);
        assert!(report.saved_models.iter().all(|p| std::path::Path::new(p).exists()));
    }

    #[test]
    fn test_window_larger_than_series_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.window_size = 64;
        let result = FeatureExtractor::new(config).run_on(&sine_series(10));
        assert!(matches!(result, Err(ExtractorError::InvalidWindowSize { .. })));
    }

    #[test]
    fn test_shrink_mode_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.search_mode = SearchMode::Shrink;
        config.initial_size = 6;
        config.max_iterations = Some(2);
        let report = FeatureExtractor::new(config).run_on(&sine_series(24)).unwrap();
        assert!(report.columns.iter().all(|c| c.iterations.len() <= 2));
    }
}
