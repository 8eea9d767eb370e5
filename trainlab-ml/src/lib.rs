//! # trainlab-ml
//!
//! Runs a set of experiments through an external training framework and turns
//! the loss history the framework checkpoints into smoothed figures.

// Orchestration
pub mod backend;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod reproducibility;

// Checkpoint histories
pub mod checkpoint;

// Curves and figures
pub mod colormap;
pub mod curves;
pub mod plot;
pub mod smoothing;

// Re-exports
pub use backend::{CommandBackend, ExperimentBackend, RunMode};
pub use checkpoint::{LossHistory, LossSeries, RetrievedLosses, retrieve_losses};
pub use colormap::Colormap;
pub use error::MlError;
pub use evaluation::EvaluationOptions;
pub use experiment::{Experiment, Experiments, ExperimentsFile};
pub use plot::{LossPlotter, PlotInput};
pub use reproducibility::{Determinism, EnvironmentSnapshot, set_deterministic_on};
pub use smoothing::{Smoother, savgol_filter, smooth_curve};
