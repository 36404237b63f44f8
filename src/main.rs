//! Feature Extractor - Main Entry Point

use clap::Parser;
use feature_extractor::cli::{run_cli, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet_mode {
        "feature_extractor=warn"
    } else {
        "feature_extractor=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    run_cli(cli)
}
