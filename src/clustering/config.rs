//! Clustering configuration.

use serde::{Deserialize, Serialize};

/// Configuration for k-means training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of clusters requested. Clamped to the sample count at fit time.
    pub k: usize,

    /// Number of k-means++ restarts; the lowest-inertia run wins.
    pub n_init: usize,

    /// Maximum Lloyd iterations per restart.
    pub max_iter: usize,

    /// Convergence tolerance, relative to the mean per-feature variance of
    /// the scaled data.
    pub tol: f64,

    /// Seed for centroid initialization.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            k: 5,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the number of clusters.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Builder: set the number of restarts.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Builder: set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    /// Builder: set the convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol.max(0.0);
        self
    }

    /// Builder: set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let k = std::env::var("CLUSTER_K")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.k);

        let n_init = std::env::var("CLUSTER_N_INIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.n_init);

        let max_iter = std::env::var("CLUSTER_MAX_ITER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_iter);

        let seed = std::env::var("CLUSTER_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.seed);

        Self::default()
            .with_k(k)
            .with_n_init(n_init)
            .with_max_iter(max_iter)
            .with_seed(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.k, 5);
        assert_eq!(config.n_init, 10);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_builders_clamp_to_one() {
        let config = ClusterConfig::new().with_k(0).with_n_init(0).with_max_iter(0);
        assert_eq!(config.k, 1);
        assert_eq!(config.n_init, 1);
        assert_eq!(config.max_iter, 1);
    }
}
