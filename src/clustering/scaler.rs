//! Per-feature standardization.

use serde::{Deserialize, Serialize};

use crate::models::FEATURE_DIM;

/// Standardizes each feature to zero mean and unit variance.
///
/// Uses the population standard deviation. A constant column gets a scale
/// of 1.0 so it maps to zero instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; FEATURE_DIM],
    pub scale: [f64; FEATURE_DIM],
}

impl StandardScaler {
    /// Fits the scaler to `rows`. An empty slice yields the identity scaler.
    pub fn fit(rows: &[[f64; FEATURE_DIM]]) -> Self {
        let mut mean = [0.0; FEATURE_DIM];
        let mut scale = [1.0; FEATURE_DIM];
        if rows.is_empty() {
            return Self { mean, scale };
        }

        let n = rows.len() as f64;
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut variance = [0.0; FEATURE_DIM];
        for row in rows {
            for d in 0..FEATURE_DIM {
                let diff = row[d] - mean[d];
                variance[d] += diff * diff;
            }
        }
        for d in 0..FEATURE_DIM {
            let std = (variance[d] / n).sqrt();
            scale[d] = if std > f64::EPSILON { std } else { 1.0 };
        }

        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut out = [0.0; FEATURE_DIM];
        for d in 0..FEATURE_DIM {
            out[d] = (row[d] - self.mean[d]) / self.scale[d];
        }
        out
    }

    pub fn transform_all(&self, rows: &[[f64; FEATURE_DIM]]) -> Vec<[f64; FEATURE_DIM]> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Maps a scaled point back to feature units.
    pub fn inverse_transform(&self, row: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut out = [0.0; FEATURE_DIM];
        for d in 0..FEATURE_DIM {
            out[d] = row[d] * self.scale[d] + self.mean[d];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_centers_and_scales() {
        let rows = [
            [1.0, 10.0, 0.5, 4.0, 1.0],
            [3.0, 20.0, 0.5, 5.0, 3.0],
        ];
        let scaler = StandardScaler::fit(&rows);

        assert_eq!(scaler.mean, [2.0, 15.0, 0.5, 4.5, 2.0]);
        assert_eq!(scaler.scale[0], 1.0);
        assert_eq!(scaler.scale[1], 5.0);

        let t = scaler.transform(&rows[0]);
        assert_eq!(t, [-1.0, -1.0, 0.0, -1.0, -1.0]);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let rows = [[7.0; FEATURE_DIM], [7.0; FEATURE_DIM]];
        let scaler = StandardScaler::fit(&rows);
        assert_eq!(scaler.scale, [1.0; FEATURE_DIM]);
        assert_eq!(scaler.transform(&rows[0]), [0.0; FEATURE_DIM]);
    }

    #[test]
    fn test_inverse_transform() {
        let rows = [
            [5000.0, 0.0, 0.5, 3.8, 1.0],
            [47000.0, 14.0, 0.9, 4.9, 4.0],
        ];
        let scaler = StandardScaler::fit(&rows);
        let back = scaler.inverse_transform(&scaler.transform(&rows[1]));
        for d in 0..FEATURE_DIM {
            assert!((back[d] - rows[1][d]).abs() < 1e-9);
        }
    }
}
