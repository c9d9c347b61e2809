//! k-means with k-means++ seeding and Lloyd iterations.
//!
//! Operates on already standardized points. Restarts share one seeded
//! ChaCha stream, so a given (points, k, seed) always yields the same
//! centroids.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::models::FEATURE_DIM;

use super::distance::{nearest, squared_euclidean, Point};

/// Parameters for a single [`KMeans::fit`] call.
#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
}

/// Result of the best restart.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub centroids: Vec<Point>,
    pub labels: Vec<usize>,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    /// Fits `params.k` centroids to `points`.
    ///
    /// Callers guarantee `1 <= k <= points.len()`.
    pub fn fit(points: &[Point], params: &KMeansParams) -> Self {
        debug_assert!(params.k >= 1 && params.k <= points.len());

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let tol = params.tol * mean_variance(points);

        let mut best: Option<KMeans> = None;
        for run in 0..params.n_init.max(1) {
            let seeds = kmeans_plus_plus(points, params.k, &mut rng);
            let result = lloyd(points, seeds, params.max_iter, tol);
            debug!(
                "k-means restart {}: inertia={:.4} after {} iterations",
                run, result.inertia, result.iterations
            );

            // Strict comparison keeps the earliest run on ties.
            if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
                best = Some(result);
            }
        }

        best.unwrap_or_else(|| lloyd(points, vec![points[0]; params.k], 1, tol))
    }
}

/// Mean of the per-feature variances.
fn mean_variance(points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let n = points.len() as f64;
    let mut total = 0.0;
    for d in 0..FEATURE_DIM {
        let mean = points.iter().map(|p| p[d]).sum::<f64>() / n;
        total += points.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
    }
    total / FEATURE_DIM as f64
}

/// Picks `k` initial centroids, each with probability proportional to its
/// squared distance from the nearest centroid chosen so far.
fn kmeans_plus_plus<R: Rng>(points: &[Point], k: usize, rng: &mut R) -> Vec<Point> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..n)]);

    let mut min_dist: Vec<f64> = points
        .iter()
        .map(|p| squared_euclidean(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_dist.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, d) in min_dist.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // Every point coincides with a centroid.
            rng.gen_range(0..n)
        };

        let centroid = points[next];
        for (d, p) in min_dist.iter_mut().zip(points) {
            *d = d.min(squared_euclidean(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn lloyd(points: &[Point], mut centroids: Vec<Point>, max_iter: usize, tol: f64) -> KMeans {
    let k = centroids.len();
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for _ in 0..max_iter {
        iterations += 1;

        let mut dist = vec![0.0; points.len()];
        for (i, p) in points.iter().enumerate() {
            let (label, d) = nearest(p, &centroids);
            labels[i] = label;
            dist[i] = d;
        }

        let mut sums = vec![[0.0; FEATURE_DIM]; k];
        let mut counts = vec![0usize; k];
        for (p, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for d in 0..FEATURE_DIM {
                sums[label][d] += p[d];
            }
        }

        let mut updated = Vec::with_capacity(k);
        for (j, (sum, count)) in sums.into_iter().zip(&counts).enumerate() {
            if *count > 0 {
                updated.push(sum.map(|s| s / *count as f64));
            } else {
                // Reseed an empty cluster at the worst-fitting point.
                let far = farthest(&dist);
                dist[far] = 0.0;
                debug!("k-means cluster {} emptied; reseeding at point {}", j, far);
                updated.push(points[far]);
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| squared_euclidean(a, b))
            .sum();
        centroids = updated;

        if shift <= tol {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, p) in points.iter().enumerate() {
        let (label, d) = nearest(p, &centroids);
        labels[i] = label;
        inertia += d;
    }

    KMeans {
        centroids,
        labels,
        inertia,
        iterations,
    }
}

fn farthest(dist: &[f64]) -> usize {
    let mut best = 0;
    for (i, d) in dist.iter().enumerate() {
        if *d > dist[best] {
            best = i;
        }
    }
    best
}
