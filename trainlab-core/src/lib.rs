//! # trainlab-core
//!
//! Shared building blocks for the trainlab crates: layered configuration,
//! atomic persistence helpers and the configuration error type.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{LoggingConfig, PlotConfig, RunnerConfig, TrainlabConfig, config_exists, load_config};
pub use error::ConfigError;
