//! Reproducibility tracking: seeds and environment snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::MlError;

/// Snapshot of the host environment a run was launched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub system_info: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    /// Hash of relevant environment variables (PATH, PYTHONPATH, CUDA_VISIBLE_DEVICES).
    pub env_vars_hash: String,
    pub seed: u64,
}

impl EnvironmentSnapshot {
    pub fn capture(seed: u64) -> Self {
        Self {
            system_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            platform: std::env::consts::OS.to_string(),
            timestamp: Utc::now(),
            env_vars_hash: Self::compute_env_vars_hash(),
            seed,
        }
    }

    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in &["PATH", "PYTHONPATH", "CUDA_VISIBLE_DEVICES"] {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Path of the snapshot of `experiment_name` inside `results_path`.
    pub fn path_for(results_path: &Path, experiment_name: &str) -> PathBuf {
        results_path.join(format!("{experiment_name}_environment.json"))
    }

    pub fn save(&self, results_path: &Path, experiment_name: &str) -> Result<PathBuf, MlError> {
        let path = Self::path_for(results_path, experiment_name);
        trainlab_core::persistence::atomic_write_json(&path, self)?;
        Ok(path)
    }
}

/// Seed and determinism switches handed to every framework run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Determinism {
    pub seed: u64,
}

impl Determinism {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Environment of a deterministic run.
    ///
    /// `TRAINLAB_SEED` reseeds the framework's generators; the others pin
    /// Python's hash seed and cuBLAS to reproducible workspaces.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("TRAINLAB_SEED", self.seed.to_string()),
            ("PYTHONHASHSEED", self.seed.to_string()),
            ("CUBLAS_WORKSPACE_CONFIG", ":4096:8".to_string()),
        ]
    }
}

/// Fix the seed every subsequent run is started with.
///
/// trainlab itself draws no random numbers; the framework reseeds from the
/// environment built by [`Determinism::env_vars`].
pub fn set_deterministic_on(seed: u64) -> Determinism {
    tracing::info!(seed, "Deterministic mode enabled");
    Determinism::new(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_deterministic_env_carries_seed() {
        let determinism = set_deterministic_on(1234);
        let env = determinism.env_vars();
        let get = |key: &str| {
            env.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("TRAINLAB_SEED"), Some("1234"));
        assert_eq!(get("PYTHONHASHSEED"), Some("1234"));
        assert_eq!(get("CUBLAS_WORKSPACE_CONFIG"), Some(":4096:8"));
    }

    #[test]
    fn test_snapshot_saved_next_to_results() {
        let dir = TempDir::new().unwrap();
        let snapshot = EnvironmentSnapshot::capture(7);
        let path = snapshot.save(dir.path(), "baseline").unwrap();

        assert_eq!(path, dir.path().join("baseline_environment.json"));
        let loaded: EnvironmentSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.env_vars_hash.len(), 64);
    }
}
