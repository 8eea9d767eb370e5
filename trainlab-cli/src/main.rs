//! trainlab CLI: train, evaluate and plot sets of experiments.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// trainlab: orchestrate training experiments and compare their losses
#[derive(Parser, Debug)]
#[command(name = "trainlab", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train every experiment of an experiments file, in order
    Train {
        /// Experiments file (JSON)
        experiments: PathBuf,
    },
    /// Evaluate trained experiments
    Evaluate {
        /// Experiments file (JSON)
        experiments: PathBuf,
        /// Evaluation options (JSON); nothing is evaluated when omitted
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Plot the smoothed loss and perplexity curves of trained experiments
    PlotLosses {
        /// Experiments file (JSON)
        experiments: PathBuf,
        /// Directory holding the checkpoints (defaults to the one in the experiments file)
        #[arg(long)]
        experiments_path: Option<PathBuf>,
        /// Colormap telling experiments apart (nipy_spectral, tab20)
        #[arg(long)]
        colormap: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = trainlab_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let (json_layer, _guard) = if config.logging.json_file {
        let log_dir = config.logging.log_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "trainlab", "trainlab")
                .map(|d| d.data_dir().join("logs"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "trainlab.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &workspace, config).await
}
