//! Experiments: loading, training, evaluation and loss plotting.
//!
//! An experiments file is a JSON document naming a global YAML configuration,
//! the directories where checkpoints and results go, a seed, and the
//! experiments themselves with their configuration overrides:
//!
//! ```json
//! {
//!     "configuration_path": "configurations/vctk.yaml",
//!     "experiments_path": "experiments",
//!     "results_path": "results",
//!     "seed": 1234,
//!     "experiments": {
//!         "baseline": {},
//!         "jitter": { "use_jitter": true, "jitter_probability": 0.12 }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use trainlab_core::PlotConfig;

use crate::backend::ExperimentBackend;
use crate::checkpoint::retrieve_losses;
use crate::error::MlError;
use crate::evaluation::EvaluationOptions;
use crate::plot::{LossPlotter, PlotInput};
use crate::reproducibility::{EnvironmentSnapshot, set_deterministic_on};

/// A named run with its merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    /// Where the framework stores configuration and checkpoints.
    pub experiments_path: PathBuf,
    /// Where figures and evaluation results go.
    pub results_path: PathBuf,
    pub configuration: Map<String, Value>,
}

impl Experiment {
    /// Build an experiment whose configuration is `global` with `overrides`
    /// applied on top, key by key.
    pub fn new(
        name: impl Into<String>,
        experiments_path: impl Into<PathBuf>,
        results_path: impl Into<PathBuf>,
        global: &Map<String, Value>,
        overrides: &Map<String, Value>,
    ) -> Self {
        let mut configuration = global.clone();
        for (key, value) in overrides {
            configuration.insert(key.clone(), value.clone());
        }
        Self {
            name: name.into(),
            experiments_path: experiments_path.into(),
            results_path: results_path.into(),
            configuration,
        }
    }
}

/// On-disk layout of an experiments file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentsFile {
    pub configuration_path: PathBuf,
    pub experiments_path: PathBuf,
    pub results_path: PathBuf,
    pub seed: u64,
    /// Overrides by experiment name, in file order.
    pub experiments: Map<String, Value>,
}

/// An ordered set of experiments sharing a seed.
#[derive(Debug, Clone)]
pub struct Experiments {
    experiments: Vec<Experiment>,
    seed: u64,
}

impl Experiments {
    pub fn new(experiments: Vec<Experiment>, seed: u64) -> Self {
        Self { experiments, seed }
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Load an experiments file and the global configuration it names.
    pub fn load(path: &Path) -> Result<Self, MlError> {
        info!(path = %path.display(), "Loading experiments");
        let content = std::fs::read_to_string(path).map_err(|e| {
            MlError::experiment(format!("cannot read '{}': {e}", path.display()))
        })?;
        let file: ExperimentsFile = serde_json::from_str(&content).map_err(|e| {
            MlError::experiment(format!("invalid experiments file '{}': {e}", path.display()))
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let configuration_path = resolve(base, &file.configuration_path);
        let experiments_path = resolve(base, &file.experiments_path);
        let results_path = resolve(base, &file.results_path);

        let global = load_global_configuration(&configuration_path)?;

        let experiments = file
            .experiments
            .iter()
            .map(|(name, overrides)| {
                let Value::Object(overrides) = overrides else {
                    return Err(MlError::experiment(format!(
                        "overrides of experiment '{name}' must be an object"
                    )));
                };
                Ok(Experiment::new(
                    name,
                    &experiments_path,
                    &results_path,
                    &global,
                    overrides,
                ))
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        info!(
            experiments = experiments.len(),
            seed = file.seed,
            "Loaded experiments"
        );
        Ok(Self::new(experiments, file.seed))
    }

    /// Train every experiment in order, stopping at the first failure.
    pub async fn train(&self, backend: &dyn ExperimentBackend) -> Result<(), MlError> {
        let determinism = set_deterministic_on(self.seed);

        for experiment in &self.experiments {
            info!(experiment = %experiment.name, "Running experiment");
            EnvironmentSnapshot::capture(determinism.seed)
                .save(&experiment.results_path, &experiment.name)?;
            backend.train(experiment, &determinism).await?;
        }
        Ok(())
    }

    /// Evaluate every experiment, then compare clustering metrics across
    /// them if requested.
    pub async fn evaluate(
        &self,
        backend: &dyn ExperimentBackend,
        options: &EvaluationOptions,
    ) -> Result<(), MlError> {
        let determinism = set_deterministic_on(self.seed);

        if options.any_per_experiment() {
            for experiment in &self.experiments {
                info!(experiment = %experiment.name, "Evaluating experiment");
                backend
                    .evaluate(experiment, options, &determinism)
                    .await?;
            }
        } else {
            info!("No per-experiment evaluation enabled");
        }

        if options.compute_clustering_metrics_evolution {
            let results_paths: BTreeSet<&Path> = self
                .experiments
                .iter()
                .map(|e| e.results_path.as_path())
                .collect();
            let mut shared = results_paths.iter();
            let (Some(results_path), None) = (shared.next(), shared.next()) else {
                error!(
                    results_paths = results_paths.len(),
                    "All clustering metric results should be in the same result folder"
                );
                return Ok(());
            };

            let names: Vec<String> = self.experiments.iter().map(|e| e.name.clone()).collect();
            backend
                .clustering_metrics_evolution(&names, results_path)
                .await?;
        }
        Ok(())
    }

    /// Plot the loss figures of every experiment whose checkpoints are found
    /// in `experiments_path`. Returns the written figures.
    pub fn plot_losses(
        &self,
        experiments_path: &Path,
        config: &PlotConfig,
    ) -> Result<Vec<PathBuf>, MlError> {
        let plotter = LossPlotter::from_config(config)?;

        let mut inputs = Vec::with_capacity(self.experiments.len());
        for experiment in &self.experiments {
            match retrieve_losses(experiments_path, &experiment.name) {
                Ok(losses) => inputs.push(PlotInput {
                    name: experiment.name.clone(),
                    results_path: experiment.results_path.clone(),
                    losses,
                }),
                Err(e) => error!(
                    experiment = %experiment.name,
                    error = %e,
                    "Failed to retrieve losses"
                ),
            }
        }

        if inputs.is_empty() {
            warn!(
                path = %experiments_path.display(),
                "No experiment losses could be retrieved"
            );
            return Ok(Vec::new());
        }

        plotter.plot_all(&inputs)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn load_global_configuration(path: &Path) -> Result<Map<String, Value>, MlError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MlError::config(format!("cannot read configuration '{}': {e}", path.display()))
    })?;
    if is_blank_yaml(&content) {
        return Ok(Map::new());
    }
    let value: Value = serde_yaml::from_str(&content)?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(MlError::config(format!(
            "configuration '{}' must be a mapping",
            path.display()
        ))),
    }
}

/// Whether `content` holds no YAML node at all, only comments and markers.
fn is_blank_yaml(content: &str) -> bool {
    content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}
