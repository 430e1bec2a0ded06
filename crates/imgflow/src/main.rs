//! imgflow CLI - Multi-threaded image transformation pipeline.
//!
//! imgflow reads encoded images, runs them through a configurable chain of
//! operators (decode, resize, crop, random crop, rotate, flip) on a pool of
//! worker threads, and writes one record per image with the resulting
//! tensor shape or the error that stopped it.
//!
//! # Usage
//!
//! ```bash
//! # Transform a directory with the configured pipeline
//! imgflow run ./photos/ --output records.jsonl
//!
//! # Eight threads, CHW tensors written to disk, input order preserved
//! imgflow run ./photos/ -t 8 --chw --ordered --tensor-dir ./tensors
//!
//! # List available operators
//! imgflow ops
//!
//! # View configuration
//! imgflow config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// imgflow - Multi-threaded image transformation pipeline.
#[derive(Parser, Debug)]
#[command(name = "imgflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "IMGFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Transform images through the configured operator pipeline
    Run(cli::run::RunArgs),

    /// List available pipeline operators
    Ops,

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match &cli.config {
        Some(path) => imgflow_core::Config::load_from(path)?,
        None => match imgflow_core::Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `imgflow config path`."
                );
                imgflow_core::Config::default()
            }
        },
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("imgflow v{}", imgflow_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config).await,
        Commands::Ops => cli::ops::execute().await,
        Commands::Config(args) => cli::config::execute(args, config).await,
    }
}
