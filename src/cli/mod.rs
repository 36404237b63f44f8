//! Feature Extractor CLI Module
//!
//! Command-line flags, configuration assembly and the terminal summary.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;
use colored::*;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{
    load_config, ConfigMerger, ErrorMetric, ExtractorConfig, SearchMode, TrainingMode,
};
use crate::error::ExtractorError;
use crate::pipeline::{FeatureExtractor, PipelineReport};
use crate::plugins::PluginRegistry;
use crate::search::SearchState;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 180, 80) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug, Default)]
#[command(name = "feature-extractor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Autoencoder feature extraction for time series with adaptive interface size search")]
#[command(long_about = None)]
pub struct Cli {
    /// Input CSV file
    pub csv_file: Option<String>,

    /// Prefix for saved encoder models
    #[arg(long)]
    pub save_encoder: Option<String>,

    /// Prefix for saved decoder models
    #[arg(long)]
    pub save_decoder: Option<String>,

    /// Prefix of a pre-trained encoder to load
    #[arg(long)]
    pub load_encoder: Option<String>,

    /// Prefix of a pre-trained decoder to load
    #[arg(long)]
    pub load_decoder: Option<String>,

    /// Prefix for latent code CSV files
    #[arg(long)]
    pub evaluate_encoder: Option<String>,

    /// Prefix for decoded sample CSV files
    #[arg(long)]
    pub evaluate_decoder: Option<String>,

    /// Encoder plugin (default, ann, cnn)
    #[arg(long)]
    pub encoder_plugin: Option<String>,

    /// Decoder plugin (default, ann, cnn)
    #[arg(long)]
    pub decoder_plugin: Option<String>,

    /// Sliding window length
    #[arg(long)]
    pub window_size: Option<usize>,

    /// Reconstruction error threshold that ends the search
    #[arg(long)]
    pub threshold_error: Option<f64>,

    /// First interface size tried
    #[arg(long)]
    pub initial_size: Option<usize>,

    /// Interface size increment
    #[arg(long)]
    pub step_size: Option<usize>,

    /// Search direction (grow, shrink)
    #[arg(long)]
    pub search_mode: Option<String>,

    /// Error compared against the threshold (mse, mae)
    #[arg(long)]
    pub error_metric: Option<String>,

    /// Maximum number of search iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Wall-clock budget of a search in seconds
    #[arg(long)]
    pub max_search_secs: Option<u64>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Early stopping patience in epochs (0 disables)
    #[arg(long)]
    pub patience: Option<usize>,

    /// Training loss (mse, huber)
    #[arg(long)]
    pub loss: Option<String>,

    /// Training mode (joint, two_stage)
    #[arg(long)]
    pub training_mode: Option<String>,

    /// Dataset periodicity (1min, 5min, 15min, 1h, 4h, daily)
    #[arg(long)]
    pub dataset_periodicity: Option<String>,

    /// Read configuration from a JSON file
    #[arg(long)]
    pub load_config: Option<String>,

    /// Write non-default configuration to a JSON file
    #[arg(long)]
    pub save_config: Option<String>,

    /// Prefix for reconstructed CSV files
    #[arg(short, long)]
    pub output: Option<String>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only warnings and errors
    #[arg(short, long)]
    pub quiet_mode: bool,

    /// Include the date column in output files
    #[arg(long)]
    pub force_date: bool,

    /// Input CSV has a header row
    #[arg(long)]
    pub headers: bool,

    /// Train on rows of all columns instead of per-column windows
    #[arg(long)]
    pub no_sliding_windows: bool,

    /// Plugin parameter override, repeatable
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

impl Cli {
    /// Values given explicitly on the command line, keyed like the config
    pub fn overrides(&self) -> anyhow::Result<Map<String, Value>> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                map.insert(key.to_string(), v);
            }
        };

        put("csv_file", self.csv_file.clone().map(Value::from));
        put("save_encoder", self.save_encoder.clone().map(Value::from));
        put("save_decoder", self.save_decoder.clone().map(Value::from));
        put("load_encoder", self.load_encoder.clone().map(Value::from));
        put("load_decoder", self.load_decoder.clone().map(Value::from));
        put("evaluate_encoder", self.evaluate_encoder.clone().map(Value::from));
        put("evaluate_decoder", self.evaluate_decoder.clone().map(Value::from));
        put("encoder_plugin", self.encoder_plugin.clone().map(Value::from));
        put("decoder_plugin", self.decoder_plugin.clone().map(Value::from));
        put("window_size", self.window_size.map(Value::from));
        put("threshold_error", self.threshold_error.map(Value::from));
        put("initial_size", self.initial_size.map(Value::from));
        put("step_size", self.step_size.map(Value::from));
        put("search_mode", canonical::<SearchMode>(&self.search_mode)?);
        put("error_metric", canonical::<ErrorMetric>(&self.error_metric)?);
        put("max_iterations", self.max_iterations.map(Value::from));
        put("max_search_secs", self.max_search_secs.map(Value::from));
        put("epochs", self.epochs.map(Value::from));
        put("batch_size", self.batch_size.map(Value::from));
        put("learning_rate", self.learning_rate.map(Value::from));
        put("patience", self.patience.map(Value::from));
        put("loss", self.loss.as_deref().map(|l| Value::from(l.to_lowercase())));
        put("training_mode", canonical::<TrainingMode>(&self.training_mode)?);
        put("dataset_periodicity", self.dataset_periodicity.clone().map(Value::from));
        put("load_config", self.load_config.clone().map(Value::from));
        put("save_config", self.save_config.clone().map(Value::from));
        put("csv_output_path", self.output.clone().map(Value::from));
        put("seed", self.seed.map(Value::from));
        put("quiet_mode", self.quiet_mode.then_some(Value::Bool(true)));
        put("force_date", self.force_date.then_some(Value::Bool(true)));
        put("headers", self.headers.then_some(Value::Bool(true)));
        put("use_sliding_windows", self.no_sliding_windows.then_some(Value::Bool(false)));

        for entry in &self.set {
            let (key, raw) = parse_assignment(entry)?;
            map.insert(key, raw);
        }
        Ok(map)
    }
}

/// Parse a flag through its `FromStr` aliases into the serialized form
fn canonical<T>(raw: &Option<String>) -> anyhow::Result<Option<Value>>
where
    T: FromStr<Err = ExtractorError> + Serialize,
{
    raw.as_deref()
        .map(|s| -> anyhow::Result<Value> { Ok(serde_json::to_value(s.parse::<T>()?)?) })
        .transpose()
}

/// Parse `key=value`; the value is read as JSON when possible, else as a string
pub fn parse_assignment(entry: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = entry
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{}'", entry))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in '{}'", entry);
    }
    let value = serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::from(raw.trim()));
    Ok((key.to_string(), value))
}

// ─── Configuration ─────────────────────────────────────────────────────────────

/// Assemble the run configuration from defaults, file, plugins and flags
pub fn build_config(cli: &Cli, registry: &PluginRegistry) -> anyhow::Result<ExtractorConfig> {
    let cli_values = cli.overrides()?;
    let file_values = match &cli.load_config {
        Some(path) => load_config(path)?,
        None => Map::new(),
    };

    // Plugin choice is needed before the merge to collect plugin defaults.
    let pick = |key: &str| -> String {
        cli_values
            .get(key)
            .or_else(|| file_values.get(key))
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string()
    };
    let encoder_plugin = pick("encoder_plugin");
    let decoder_plugin = pick("decoder_plugin");

    let config = ConfigMerger::new()
        .with_file(file_values)
        .with_plugin_params(registry.encoder_params(&encoder_plugin)?)
        .with_plugin_params(registry.decoder_params(&decoder_plugin)?)
        .with_cli(cli_values)
        .merge()?;
    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Run the extractor as configured by `cli`
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let registry = PluginRegistry::with_builtin();
    let config = build_config(&cli, &registry)?;
    let quiet = config.quiet_mode;

    if !quiet {
        section("Feature Extractor");
        println!("  {}", kv("input     ", &config.csv_file));
        println!("  {}", kv("plugins   ", &format!("{} / {}", config.encoder_plugin, config.decoder_plugin)));
        println!("  {}", kv("search    ", &format!(
            "{} from {} by {} until {} <= {}",
            config.search_mode, config.initial_size, config.step_size, config.error_metric, config.threshold_error
        )));
        println!("  {}", kv("training  ", &format!(
            "{} epochs, batch {}, lr {}, {}",
            config.epochs, config.batch_size, config.learning_rate, config.training_mode
        )));
        println!();
        step_run("Extracting features");
    }

    let start = Instant::now();
    let report = FeatureExtractor::new(config)
        .with_registry(registry)
        .run()?;

    if !quiet {
        step_done(&format!("{:.2?}", start.elapsed()));
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &PipelineReport) {
    section("Columns");
    for column in &report.columns {
        let state = match column.state {
            Some(SearchState::Converged) => ok("converged"),
            Some(state) => warn(&state.to_string()),
            None => accent("pre-trained"),
        };
        println!("  {} {}", column.column.white().bold(), state);
        println!("    {}", kv("interface ", &format!("{} (latent {})", column.interface_size, column.latent_dim)));
        println!("    {}", kv("iterations", &column.iterations.len().to_string()));
        println!("    {}", kv("mse       ", &format!("{:.6}", column.reconstruction_score.mse)));
        println!("    {}", kv("mae       ", &format!("{:.6}", column.reconstruction_score.mae)));
        if let Some(info) = &column.information {
            println!("    {}", kv("entropy   ", &format!("{:.3} bits", info.entropy)));
        }
        println!("    {}", kv("output    ", &column.output_file));
    }

    if !report.saved_models.is_empty() {
        section("Models");
        for path in &report.saved_models {
            println!("  {} {}", ok("✓"), PathBuf::from(path).display());
        }
    }
    println!();
}
