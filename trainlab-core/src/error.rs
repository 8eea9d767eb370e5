//! Error types for configuration handling.

use std::path::PathBuf;

/// Errors raised while loading or validating the trainlab configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
