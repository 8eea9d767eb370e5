//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use std::path::{Path, PathBuf};
use trainlab_core::TrainlabConfig;
use trainlab_ml::{CommandBackend, EvaluationOptions, Experiments};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config: TrainlabConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Train { experiments } => handle_train(&experiments, &config).await,
        Commands::Evaluate {
            experiments,
            options,
        } => handle_evaluate(&experiments, options.as_deref(), &config).await,
        Commands::PlotLosses {
            experiments,
            experiments_path,
            colormap,
        } => handle_plot_losses(&experiments, experiments_path, colormap, config),
        Commands::Config { action } => handle_config(action, workspace, &config),
    }
}

async fn handle_train(path: &Path, config: &TrainlabConfig) -> anyhow::Result<()> {
    let experiments = Experiments::load(path)?;
    let backend = CommandBackend::from_config(&config.runner);
    experiments.train(&backend).await?;
    println!("Trained {} experiment(s)", experiments.experiments().len());
    Ok(())
}

async fn handle_evaluate(
    path: &Path,
    options: Option<&Path>,
    config: &TrainlabConfig,
) -> anyhow::Result<()> {
    let experiments = Experiments::load(path)?;
    let options = match options {
        Some(options) => EvaluationOptions::load(options)?,
        None => EvaluationOptions::default(),
    };
    let backend = CommandBackend::from_config(&config.runner);
    experiments.evaluate(&backend, &options).await?;
    Ok(())
}

fn handle_plot_losses(
    path: &Path,
    experiments_path: Option<PathBuf>,
    colormap: Option<String>,
    mut config: TrainlabConfig,
) -> anyhow::Result<()> {
    let experiments = Experiments::load(path)?;
    if let Some(colormap) = colormap {
        config.plot.colormap = colormap;
    }

    let Some(experiments_path) = experiments_path.or_else(|| {
        experiments
            .experiments()
            .first()
            .map(|e| e.experiments_path.clone())
    }) else {
        println!("No experiments to plot.");
        return Ok(());
    };

    let saved = experiments.plot_losses(&experiments_path, &config.plot)?;
    if saved.is_empty() {
        println!("No figure written.");
    } else {
        println!("Saved {} figure(s):", saved.len());
        for figure in &saved {
            println!("  {}", figure.display());
        }
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config: &TrainlabConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = trainlab_core::config::config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = TrainlabConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            trainlab_core::persistence::atomic_write(&config_path, toml_str.as_bytes())?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
