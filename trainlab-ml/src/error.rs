//! Error types for the trainlab-ml crate.

use thiserror::Error;

/// Top-level error type for experiment operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Experiment error: {0}")]
    Experiment(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn experiment(msg: impl Into<String>) -> Self {
        Self::Experiment(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn plot(msg: impl Into<String>) -> Self {
        Self::Plot(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<trainlab_core::ConfigError> for MlError {
    fn from(err: trainlab_core::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ndarray::ShapeError> for MlError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape(err.to_string())
    }
}
