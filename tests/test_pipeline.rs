//! Integration test: CSV in, search, reconstruction and models out

use std::fs::File;
use std::path::Path;

use feature_extractor::config::{ExtractorConfig, SearchMode};
use feature_extractor::pipeline::{FeatureExtractor, ROW_MODE_UNIT};
use feature_extractor::search::SearchState;
use feature_extractor::utils::DataLoader;
use polars::prelude::*;

fn write_fixture(path: &Path, rows: usize, with_dates: bool) {
    let price: Vec<f64> = (0..rows).map(|i| ((i as f64) * 0.25).sin() * 0.4 + 0.5).collect();
    let volume: Vec<f64> = (0..rows).map(|i| ((i as f64) * 0.1).cos() * 0.3 + 0.5).collect();
    let mut df = if with_dates {
        let dates: Vec<String> = (0..rows)
            .map(|i| format!("2024-01-{:02} {:02}:00:00", 1 + i / 24, i % 24))
            .collect();
        df!("date" => &dates, "price" => &price, "volume" => &volume).unwrap()
    } else {
        df!("price" => &price, "volume" => &volume).unwrap()
    };
    let mut file = File::create(path).unwrap();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df).unwrap();
}

fn config_for(dir: &Path, csv: &Path) -> ExtractorConfig {
    let prefix = |name: &str| dir.join(name).to_str().unwrap().to_string();
    ExtractorConfig {
        csv_file: csv.to_str().unwrap().to_string(),
        headers: true,
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
fn test_csv_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("input.csv");
    write_fixture(&csv, 40, false);

    let report = FeatureExtractor::new(config_for(dir.path(), &csv)).run().unwrap();

    let names: Vec<&str> = report.columns.iter().map(|c| c.column.as_str()).collect();
    assert_eq!(names, vec!["price", "volume"]);
    for column in &report.columns {
        assert_eq!(column.state, Some(SearchState::Converged));
        assert_eq!(column.iterations.len(), 1);
        assert!(column.information.is_some());

        let restored = DataLoader::new().load_csv(&column.output_file, true).unwrap();
        assert_eq!(restored.len(), 40);
    }
    assert!(dir.path().join("encoder_price.json").exists());
    assert!(dir.path().join("decoder_volume.json").exists());
}

#[test]
fn test_reconstruction_keeps_dates_when_forced() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("dated.csv");
    write_fixture(&csv, 30, true);

    let mut config = config_for(dir.path(), &csv);
    config.force_date = true;
    let report = FeatureExtractor::new(config).run().unwrap();

    let restored = DataLoader::new().load_csv(&report.columns[0].output_file, true).unwrap();
    assert_eq!(restored.timestamps().map(|t| t.len()), Some(30));
    assert_eq!(restored.column_names(), &["price".to_string()]);
}

#[test]
fn test_pretrained_models_skip_the_search() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("input.csv");
    write_fixture(&csv, 40, false);

    let config = config_for(dir.path(), &csv);
    let first = FeatureExtractor::new(config.clone()).run().unwrap();

    let mut reuse = config.clone();
    reuse.load_encoder = Some(config.save_encoder.clone());
    reuse.load_decoder = Some(config.save_decoder.clone());
    reuse.csv_output_path = dir.path().join("again").to_str().unwrap().to_string();
    let second = FeatureExtractor::new(reuse).run().unwrap();

    assert!(second.saved_models.is_empty());
    for (a, b) in first.columns.iter().zip(&second.columns) {
        assert_eq!(b.state, None);
        assert!(b.iterations.is_empty());
        assert_eq!(a.latent_dim, b.latent_dim);
        assert!((a.reconstruction_score.mse - b.reconstruction_score.mse).abs() < 1e-9);
    }
}

#[test]
fn test_row_mode_and_evaluation_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("input.csv");
    write_fixture(&csv, 24, false);

    let mut config = config_for(dir.path(), &csv);
    config.use_sliding_windows = false;
    config.initial_size = 1;
    config.step_size = 1;
    config.evaluate_encoder = Some(dir.path().join("latent").to_str().unwrap().to_string());
    config.evaluate_decoder = Some(dir.path().join("decoded").to_str().unwrap().to_string());
    let report = FeatureExtractor::new(config).run().unwrap();

    assert_eq!(report.columns.len(), 2);
    assert!(report.columns.iter().all(|c| c.interface_size == 1));

    let latent_path = dir.path().join(format!("latent_{}.csv", ROW_MODE_UNIT));
    let latent = DataLoader::new().load_csv(latent_path.to_str().unwrap(), true).unwrap();
    assert_eq!(latent.len(), 24);
    assert_eq!(latent.column_names().len(), 1);

    let decoded_path = dir.path().join(format!("decoded_{}.csv", ROW_MODE_UNIT));
    let decoded = DataLoader::new().load_csv(decoded_path.to_str().unwrap(), true).unwrap();
    assert_eq!(decoded.column_names().len(), 2);
}

#[test]
fn test_grow_search_exhausts_below_window() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("input.csv");
    write_fixture(&csv, 30, false);

    let mut config = config_for(dir.path(), &csv);
    config.threshold_error = 1e-12;
    config.search_mode = SearchMode::Grow;
    let report = FeatureExtractor::new(config).run().unwrap();

    for column in &report.columns {
        assert_eq!(column.state, Some(SearchState::Exhausted));
        let sizes: Vec<usize> = column.iterations.iter().map(|i| i.interface_size).collect();
        assert_eq!(sizes, vec![2, 4, 6]);
        assert_eq!(column.interface_size, 6);
    }
}

#[test]
fn test_saved_config_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("input.csv");
    write_fixture(&csv, 30, false);
    let saved = dir.path().join("run.json");

    let mut config = config_for(dir.path(), &csv);
    config.save_config = Some(saved.to_str().unwrap().to_string());
    FeatureExtractor::new(config.clone()).run().unwrap();

    let values = feature_extractor::config::load_config(saved.to_str().unwrap()).unwrap();
    assert_eq!(values.get("window_size").and_then(|v| v.as_u64()), Some(8));
    assert!(!values.contains_key("patience"));
}
