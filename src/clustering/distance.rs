//! Distance helpers for scaled feature points.

use crate::models::FEATURE_DIM;

pub type Point = [f64; FEATURE_DIM];

pub fn squared_euclidean(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the nearest centroid and its squared distance.
///
/// Ties resolve to the lowest index. Returns `(0, f64::INFINITY)` for an
/// empty centroid list.
pub fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_euclidean(point, c);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    (best, best_dist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_euclidean() {
        let a = [0.0, 0.0, 0.0, 0.0, 0.0];
        let b = [1.0, 2.0, 0.0, 0.0, 2.0];
        assert_eq!(squared_euclidean(&a, &b), 9.0);
    }

    #[test]
    fn test_nearest_prefers_lowest_index_on_tie() {
        let centroids = [[1.0; FEATURE_DIM], [-1.0; FEATURE_DIM]];
        let (idx, dist) = nearest(&[0.0; FEATURE_DIM], &centroids);
        assert_eq!(idx, 0);
        assert_eq!(dist, 5.0);
    }
}
