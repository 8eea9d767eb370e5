//! Configuration system for trainlab.
//!
//! Uses `figment` for layered configuration: defaults -> user file -> workspace
//! file -> environment -> explicit file. Configuration is loaded from
//! `~/.config/trainlab/config.toml` and/or `.trainlab/config.toml` in the
//! workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level trainlab configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainlabConfig {
    /// External training framework invocation.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Curve smoothing and figure settings.
    #[serde(default)]
    pub plot: PlotConfig,
    /// Log sinks.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the external training framework is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Executable of the training framework.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the mode (`train`, `evaluate`, ...).
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Wall-clock limit of a single run, in seconds. Runs are unbounded when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: None,
        }
    }
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["main.py".to_string()]
}

/// Settings of the loss/perplexity figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Colormap used to tell experiments apart.
    #[serde(default = "default_colormap")]
    pub colormap: String,
    /// Colormap used to tell the loss types of one experiment apart.
    #[serde(default = "default_loss_types_colormap")]
    pub loss_types_colormap: String,
    /// Largest Savitzky–Golay window (odd).
    #[serde(default = "default_max_window_length")]
    pub max_window_length: usize,
    /// Order of the smoothing polynomial.
    #[serde(default = "default_polyorder")]
    pub polyorder: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            colormap: default_colormap(),
            loss_types_colormap: default_loss_types_colormap(),
            max_window_length: default_max_window_length(),
            polyorder: default_polyorder(),
        }
    }
}

fn default_colormap() -> String {
    "nipy_spectral".to_string()
}

fn default_loss_types_colormap() -> String {
    "tab20".to_string()
}

fn default_max_window_length() -> usize {
    201
}

fn default_polyorder() -> usize {
    7
}

/// Log sink configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write JSON lines to a daily rolling file.
    #[serde(default = "default_true")]
    pub json_file: bool,
    /// Directory of the rolling log files; the platform data dir when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_file: true,
            log_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl TrainlabConfig {
    /// Reject values the rest of the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.program.trim().is_empty() {
            return Err(ConfigError::invalid("runner.program must not be empty"));
        }
        if self.runner.timeout_secs == Some(0) {
            return Err(ConfigError::invalid("runner.timeout_secs must be positive"));
        }
        if self.plot.max_window_length == 0 || self.plot.max_window_length % 2 == 0 {
            return Err(ConfigError::invalid(format!(
                "plot.max_window_length must be a positive odd number, got {}",
                self.plot.max_window_length
            )));
        }
        Ok(())
    }
}

/// Workspace-local configuration file path.
pub fn config_path(workspace: &Path) -> PathBuf {
    workspace.join(".trainlab").join("config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "trainlab", "trainlab")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides file (`--config`)
/// 2. Environment variables (prefixed with `TRAINLAB_`, nested keys split on `__`)
/// 3. Workspace-local config (`.trainlab/config.toml`)
/// 4. User config (`~/.config/trainlab/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&Path>,
) -> Result<TrainlabConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(TrainlabConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // TRAINLAB_PLOT__COLORMAP, TRAINLAB_RUNNER__TIMEOUT_SECS, ...
    figment = figment.merge(Env::prefixed("TRAINLAB_").split("__"));

    if let Some(path) = overrides {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: TrainlabConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    tracing::debug!(
        program = %config.runner.program,
        colormap = %config.plot.colormap,
        "Configuration loaded"
    );
    Ok(config)
}

/// Check whether any trainlab configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| config_path(ws).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_reference_plotting() {
        let config = TrainlabConfig::default();
        assert_eq!(config.plot.colormap, "nipy_spectral");
        assert_eq!(config.plot.loss_types_colormap, "tab20");
        assert_eq!(config.plot.max_window_length, 201);
        assert_eq!(config.plot.polyorder, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workspace_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_dir(".trainlab")?;
            jail.create_file(
                ".trainlab/config.toml",
                r#"
                [runner]
                program = "python"
                args = ["-m", "vqvae"]

                [plot]
                colormap = "tab20"
                "#,
            )?;
            jail.set_env("TRAINLAB_PLOT__POLYORDER", "3");

            let config = load_config(Some(jail.directory()), None).expect("config");
            assert_eq!(config.runner.program, "python");
            assert_eq!(config.runner.args, vec!["-m".to_string(), "vqvae".to_string()]);
            assert_eq!(config.plot.colormap, "tab20");
            assert_eq!(config.plot.polyorder, 3);
            assert_eq!(config.plot.max_window_length, 201);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_missing() {
        Jail::expect_with(|jail| {
            let missing = jail.directory().join("nope.toml");
            let err = load_config(None, Some(&missing)).unwrap_err();
            assert!(matches!(err, ConfigError::FileNotFound { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_even_window_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[plot]\nmax_window_length = 200\n")?;
            let path = jail.directory().join("custom.toml");
            let err = load_config(None, Some(&path)).unwrap_err();
            assert!(err.to_string().contains("max_window_length"));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_beats_environment() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[plot]\ncolormap = \"tab20\"\n")?;
            jail.set_env("TRAINLAB_PLOT__COLORMAP", "nipy_spectral");
            jail.set_env("TRAINLAB_PLOT__POLYORDER", "5");
            let path = jail.directory().join("custom.toml");

            let config = load_config(None, Some(&path)).expect("config");
            assert_eq!(config.plot.colormap, "tab20");
            assert_eq!(config.plot.polyorder, 5);
            Ok(())
        });
    }

    #[test]
    fn test_runs_are_unbounded_by_default() {
        assert_eq!(TrainlabConfig::default().runner.timeout_secs, None);

        Jail::expect_with(|jail| {
            jail.set_env("TRAINLAB_RUNNER__TIMEOUT_SECS", "0");
            let err = load_config(Some(jail.directory()), None).unwrap_err();
            assert!(err.to_string().contains("timeout_secs"));

            jail.set_env("TRAINLAB_RUNNER__TIMEOUT_SECS", "172800");
            let config = load_config(Some(jail.directory()), None).expect("config");
            assert_eq!(config.runner.timeout_secs, Some(172_800));
            Ok(())
        });
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = TrainlabConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: TrainlabConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
