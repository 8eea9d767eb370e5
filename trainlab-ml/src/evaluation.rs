//! Evaluation options forwarded to the training framework.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MlError;

/// Which evaluations to run. Every flag defaults to off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationOptions {
    pub plot_comparaison_plot: bool,
    pub plot_quantized_embedding_spaces: bool,
    pub plot_distances_histogram: bool,
    pub compute_many_to_one_mapping: bool,
    pub compute_alignments: bool,
    pub compute_clustering_metrics: bool,
    pub compute_groundtruth_average_phonemes_number: bool,
    pub plot_clustering_metrics_evolution: bool,
    pub check_clustering_metrics_stability_over_seeds: bool,
    pub plot_gradient_stats: bool,
    /// Cross-experiment evolution of the clustering metrics; runs once after
    /// every experiment has been evaluated.
    pub compute_clustering_metrics_evolution: bool,
}

impl EvaluationOptions {
    /// Read options from a JSON file.
    pub fn load(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            MlError::config(format!(
                "invalid evaluation options '{}': {e}",
                path.display()
            ))
        })
    }

    /// Whether any evaluation has to run on individual experiments.
    pub fn any_per_experiment(&self) -> bool {
        let Self {
            plot_comparaison_plot,
            plot_quantized_embedding_spaces,
            plot_distances_histogram,
            compute_many_to_one_mapping,
            compute_alignments,
            compute_clustering_metrics,
            compute_groundtruth_average_phonemes_number,
            plot_clustering_metrics_evolution,
            check_clustering_metrics_stability_over_seeds,
            plot_gradient_stats,
            compute_clustering_metrics_evolution: _,
        } = self;
        [
            plot_comparaison_plot,
            plot_quantized_embedding_spaces,
            plot_distances_histogram,
            compute_many_to_one_mapping,
            compute_alignments,
            compute_clustering_metrics,
            compute_groundtruth_average_phonemes_number,
            plot_clustering_metrics_evolution,
            check_clustering_metrics_stability_over_seeds,
            plot_gradient_stats,
        ]
        .into_iter()
        .any(|flag| *flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_run_nothing() {
        let options = EvaluationOptions::default();
        assert!(!options.any_per_experiment());
        assert!(!options.compute_clustering_metrics_evolution);
    }

    #[test]
    fn test_evolution_alone_is_not_per_experiment() {
        let options = EvaluationOptions {
            compute_clustering_metrics_evolution: true,
            ..Default::default()
        };
        assert!(!options.any_per_experiment());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "compute_alignments": true }"#).unwrap();

        let options = EvaluationOptions::load(&path).unwrap();
        assert!(options.compute_alignments);
        assert!(options.any_per_experiment());
    }

    #[test]
    fn test_load_rejects_unknown_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "compute_everything": true }"#).unwrap();

        let err = EvaluationOptions::load(&path).unwrap_err();
        assert!(matches!(err, MlError::Config(_)));
    }
}
