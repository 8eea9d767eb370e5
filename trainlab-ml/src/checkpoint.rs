//! Checkpoint discovery and loss history merging.
//!
//! The training framework leaves, for an experiment `name`, one
//! `<name>_configuration.yaml` and one `<name>_<epoch>_checkpoint.json` per
//! saved epoch in the experiments directory. Each checkpoint carries the loss
//! and perplexity points logged since the previous one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::MlError;

const CONFIGURATION_SUFFIX: &str = "_configuration.yaml";
const CHECKPOINT_SUFFIX: &str = "_checkpoint.json";

/// Name of the loss series drawn in the loss/perplexity figures.
pub const TOTAL_LOSS: &str = "loss";

/// A checkpoint file located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFile {
    pub epoch: usize,
    pub path: PathBuf,
}

/// Loss history stored in a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    /// Loss series by name, in the order the framework logged them.
    pub train_res_losses: serde_json::Map<String, serde_json::Value>,
    pub train_res_perplexities: Vec<f64>,
}

impl Checkpoint {
    pub fn load(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            MlError::checkpoint(format!("failed to parse '{}': {e}", path.display()))
        })
    }

    /// Loss series as numeric vectors, keeping their order.
    pub fn loss_series(&self) -> Result<Vec<(String, Vec<f64>)>, MlError> {
        self.train_res_losses
            .iter()
            .map(|(name, values)| {
                let values: Vec<f64> = serde_json::from_value(values.clone()).map_err(|e| {
                    MlError::checkpoint(format!(
                        "loss '{name}' of epoch {} is not a list of numbers: {e}",
                        self.epoch
                    ))
                })?;
                Ok((name.clone(), values))
            })
            .collect()
    }
}

/// A named loss curve.
#[derive(Debug, Clone, PartialEq)]
pub struct LossSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Loss and perplexity curves of one experiment, all checkpoints concatenated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossHistory {
    pub losses: Vec<LossSeries>,
    pub perplexities: Vec<f64>,
}

impl LossHistory {
    pub fn loss(&self, name: &str) -> Option<&[f64]> {
        self.losses
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.values.as_slice())
    }

    pub fn loss_names(&self) -> impl Iterator<Item = &str> {
        self.losses.iter().map(|s| s.name.as_str())
    }
}

/// Losses of an experiment ready to be plotted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedLosses {
    pub history: LossHistory,
    /// Number of checkpoints, i.e. the number of epochs covered.
    pub latest_epoch: usize,
}

/// Find the configuration and checkpoint files of `experiment_name` in `dir`.
///
/// Checkpoints are returned in epoch order.
pub fn search_configuration_and_checkpoints(
    dir: &Path,
    experiment_name: &str,
) -> Result<(Option<PathBuf>, Vec<CheckpointFile>), MlError> {
    if !dir.is_dir() {
        return Err(MlError::not_found(format!(
            "experiments directory '{}'",
            dir.display()
        )));
    }

    let configuration_name = format!("{experiment_name}{CONFIGURATION_SUFFIX}");
    let prefix = format!("{experiment_name}_");

    let mut configuration = None;
    let mut checkpoints = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };

        if file_name == configuration_name {
            configuration = Some(entry.path());
            continue;
        }

        let epoch = file_name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(CHECKPOINT_SUFFIX))
            .and_then(|epoch| epoch.parse::<usize>().ok());
        if let Some(epoch) = epoch {
            checkpoints.push(CheckpointFile {
                epoch,
                path: entry.path(),
            });
        }
    }

    checkpoints.sort_by_key(|c| c.epoch);
    debug!(
        experiment = experiment_name,
        checkpoints = checkpoints.len(),
        has_configuration = configuration.is_some(),
        "Searched experiment files"
    );
    Ok((configuration, checkpoints))
}

/// Concatenate the loss and perplexity histories of `checkpoints`, in order.
pub fn merge_experiment_losses(checkpoints: &[CheckpointFile]) -> Result<LossHistory, MlError> {
    let mut history = LossHistory::default();

    for (index, file) in checkpoints.iter().enumerate() {
        let checkpoint = Checkpoint::load(&file.path)?;
        let series = checkpoint.loss_series()?;

        if index == 0 {
            history.losses = series
                .into_iter()
                .map(|(name, values)| LossSeries { name, values })
                .collect();
        } else {
            if series.len() != history.losses.len() {
                return Err(MlError::checkpoint(format!(
                    "checkpoint '{}' has {} loss series, expected {}",
                    file.path.display(),
                    series.len(),
                    history.losses.len()
                )));
            }
            for (name, values) in series {
                let target = history
                    .losses
                    .iter_mut()
                    .find(|s| s.name == name)
                    .ok_or_else(|| {
                        MlError::checkpoint(format!(
                            "checkpoint '{}' has unexpected loss '{name}'",
                            file.path.display()
                        ))
                    })?;
                target.values.extend(values);
            }
        }

        history
            .perplexities
            .extend_from_slice(&checkpoint.train_res_perplexities);
    }

    Ok(history)
}

/// Locate, validate and merge everything needed to plot `experiment_name`.
pub fn retrieve_losses(
    experiments_path: &Path,
    experiment_name: &str,
) -> Result<RetrievedLosses, MlError> {
    info!(
        experiment = experiment_name,
        path = %experiments_path.display(),
        "Searching configuration and checkpoints"
    );
    let (configuration, checkpoints) =
        search_configuration_and_checkpoints(experiments_path, experiment_name)?;

    let Some(configuration) = configuration else {
        return Err(MlError::not_found(format!(
            "No configuration file found with name: {experiment_name}"
        )));
    };
    if checkpoints.is_empty() {
        return Err(MlError::not_found(format!(
            "No checkpoint files found with name: {experiment_name}"
        )));
    }

    info!(path = %configuration.display(), "Loading the configuration file");
    let content = std::fs::read_to_string(&configuration)?;
    let _: serde_yaml::Value = serde_yaml::from_str(&content)?;

    info!(
        experiment = experiment_name,
        checkpoints = checkpoints.len(),
        "Merging checkpoint losses"
    );
    let history = merge_experiment_losses(&checkpoints)?;

    Ok(RetrievedLosses {
        history,
        latest_epoch: checkpoints.len(),
    })
}
