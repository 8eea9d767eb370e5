//! Seam between experiment orchestration and the training framework.
//!
//! [`CommandBackend`] launches the framework as a subprocess, one run per
//! experiment, in the manner of a managed script runner: JSON on stdin,
//! output forwarded line by line to the log, an optional wall-clock timeout
//! and kill-on-drop.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use trainlab_core::RunnerConfig;

use crate::error::MlError;
use crate::evaluation::EvaluationOptions;
use crate::experiment::Experiment;
use crate::reproducibility::Determinism;

/// Stderr lines kept for the error of a failed run.
const STDERR_TAIL_LINES: usize = 20;

/// Runs training and evaluation for experiments.
#[async_trait]
pub trait ExperimentBackend: Send + Sync {
    /// Train `experiment` deterministically.
    async fn train(&self, experiment: &Experiment, determinism: &Determinism)
    -> Result<(), MlError>;

    /// Run the enabled evaluations on a trained `experiment`.
    async fn evaluate(
        &self,
        experiment: &Experiment,
        options: &EvaluationOptions,
        determinism: &Determinism,
    ) -> Result<(), MlError>;

    /// Compare clustering metrics across `experiment_names`, whose results all
    /// live in `results_path`.
    async fn clustering_metrics_evolution(
        &self,
        experiment_names: &[String],
        results_path: &Path,
    ) -> Result<(), MlError>;
}

/// What the framework is asked to do; passed as its last argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Evaluate,
    ClusteringMetricsEvolution,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::ClusteringMetricsEvolution => "clustering-metrics-evolution",
        }
    }

    fn failure(&self, msg: String) -> MlError {
        match self {
            Self::Train => MlError::Training(msg),
            Self::Evaluate | Self::ClusteringMetricsEvolution => MlError::Evaluation(msg),
        }
    }
}

/// Runs the training framework as an external program.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandBackend {
    /// A backend whose runs are never interrupted.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kill any run still going after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        let backend = Self::new(&config.program, config.args.clone());
        match config.timeout_secs {
            Some(secs) => backend.with_timeout(Duration::from_secs(secs)),
            None => backend,
        }
    }

    /// Where the merged configuration of `experiment` is written for the framework.
    pub fn run_configuration_path(experiment: &Experiment) -> PathBuf {
        experiment
            .results_path
            .join(format!("{}_run-configuration.yaml", experiment.name))
    }

    fn write_run_configuration(experiment: &Experiment) -> Result<PathBuf, MlError> {
        let path = Self::run_configuration_path(experiment);
        let yaml = serde_yaml::to_string(&experiment.configuration)?;
        trainlab_core::persistence::atomic_write(&path, yaml.as_bytes())?;
        Ok(path)
    }

    fn experiment_env(
        experiment: &Experiment,
        determinism: &Determinism,
        configuration: &Path,
    ) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("TRAINLAB_EXPERIMENT", experiment.name.clone()),
            (
                "TRAINLAB_EXPERIMENTS_PATH",
                experiment.experiments_path.display().to_string(),
            ),
            (
                "TRAINLAB_RESULTS_PATH",
                experiment.results_path.display().to_string(),
            ),
            ("TRAINLAB_CONFIGURATION", configuration.display().to_string()),
        ];
        env.extend(determinism.env_vars());
        env
    }

    /// Spawn the framework in `mode`, feed it `input` and wait for it to
    /// exit, within the timeout if one is set.
    async fn run(
        &self,
        mode: RunMode,
        current_dir: &Path,
        env: Vec<(&'static str, String)>,
        input: Vec<u8>,
    ) -> Result<(), MlError> {
        tokio::fs::create_dir_all(current_dir).await?;
        debug!(
            program = %self.program.display(),
            mode = mode.as_str(),
            dir = %current_dir.display(),
            "Spawning training framework"
        );

        let run = self.run_to_exit(mode, current_dir, env, input);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                MlError::Timeout(format!("{} timed out after {limit:?}", mode.as_str()))
            })?,
            None => run.await,
        }
    }

    async fn run_to_exit(
        &self,
        mode: RunMode,
        current_dir: &Path,
        env: Vec<(&'static str, String)>,
        input: Vec<u8>,
    ) -> Result<(), MlError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(mode.as_str())
            .current_dir(current_dir)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                mode.failure(format!(
                    "Failed to spawn '{}': {e}",
                    self.program.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A framework that ignores its input may exit before reading it.
                if let Err(e) = stdin.write_all(&input).await {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
            }
            Ok(())
        };

        let (_, _, stderr_tail, status) = tokio::try_join!(
            feed,
            forward_lines(child.stdout.take(), mode, "stdout", 0),
            forward_lines(child.stderr.take(), mode, "stderr", STDERR_TAIL_LINES),
            child.wait(),
        )?;

        if !status.success() {
            let tail: Vec<String> = stderr_tail.into_iter().collect();
            return Err(mode.failure(format!(
                "{} failed ({status}): {}",
                mode.as_str(),
                tail.join("\n")
            )));
        }
        Ok(())
    }
}

/// Log every line of `stream` as it arrives, returning the last `keep` lines.
async fn forward_lines<R: AsyncRead + Unpin>(
    stream: Option<R>,
    mode: RunMode,
    name: &'static str,
    keep: usize,
) -> io::Result<VecDeque<String>> {
    let mut tail = VecDeque::with_capacity(keep);
    let Some(stream) = stream else {
        return Ok(tail);
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end();
        info!(mode = mode.as_str(), stream = name, "{line}");

        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }
    Ok(tail)
}

#[async_trait]
impl ExperimentBackend for CommandBackend {
    async fn train(
        &self,
        experiment: &Experiment,
        determinism: &Determinism,
    ) -> Result<(), MlError> {
        let configuration = Self::write_run_configuration(experiment)?;
        let env = Self::experiment_env(experiment, determinism, &configuration);

        info!(experiment = %experiment.name, seed = determinism.seed, "Training");
        self.run(RunMode::Train, &experiment.experiments_path, env, Vec::new())
            .await?;
        debug!(experiment = %experiment.name, "Training finished");
        Ok(())
    }

    async fn evaluate(
        &self,
        experiment: &Experiment,
        options: &EvaluationOptions,
        determinism: &Determinism,
    ) -> Result<(), MlError> {
        let configuration = Self::write_run_configuration(experiment)?;
        let env = Self::experiment_env(experiment, determinism, &configuration);
        let input = serde_json::to_vec(options)?;

        info!(experiment = %experiment.name, "Evaluating");
        self.run(RunMode::Evaluate, &experiment.experiments_path, env, input)
            .await?;
        Ok(())
    }

    async fn clustering_metrics_evolution(
        &self,
        experiment_names: &[String],
        results_path: &Path,
    ) -> Result<(), MlError> {
        let env = vec![(
            "TRAINLAB_RESULTS_PATH",
            results_path.display().to_string(),
        )];
        let input = serde_json::to_vec(experiment_names)?;

        info!(
            experiments = experiment_names.len(),
            path = %results_path.display(),
            "Computing clustering metrics evolution"
        );
        self.run(RunMode::ClusteringMetricsEvolution, results_path, env, input)
            .await?;
        Ok(())
    }
}
