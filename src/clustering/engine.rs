//! Model training and inference over POI records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{FeatureKind, FeatureVector, PoiRecord, FEATURE_DIM};

use super::config::ClusterConfig;
use super::distance::{nearest, Point};
use super::kmeans::{KMeans, KMeansParams};
use super::scaler::StandardScaler;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("no records to train on")]
    EmptyDataset,

    #[error("record {index} ({name:?}) is missing feature '{feature}'")]
    MissingFeature {
        index: usize,
        name: String,
        feature: FeatureKind,
    },

    #[error("record {index} has a non-finite feature value")]
    NonFiniteFeature { index: usize },
}

/// A trained k-means model and the scaler it was trained behind.
///
/// Centroids live in standardized space; use [`ClusterModel::centroid_features`]
/// for feature units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    pub centroids: Vec<[f64; FEATURE_DIM]>,
    pub scaler: StandardScaler,
    pub k: usize,
    pub inertia: f64,
    pub n_samples: usize,
    pub iterations: usize,
    pub trained_at: DateTime<Utc>,
}

impl ClusterModel {
    /// Nearest-centroid label for a raw feature vector.
    pub fn predict(&self, features: &FeatureVector) -> usize {
        let scaled = self.scaler.transform(features.values());
        nearest(&scaled, &self.centroids).0
    }

    /// Centroid `index` in feature units.
    pub fn centroid_features(&self, index: usize) -> Option<FeatureVector> {
        self.centroids
            .get(index)
            .map(|c| FeatureVector::from(self.scaler.inverse_transform(c)))
    }
}

/// A record together with its cluster label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteredRecord {
    #[serde(flatten)]
    pub record: PoiRecord,
    pub cluster: usize,
}

fn feature_matrix(records: &[PoiRecord]) -> Result<Vec<Point>, ClusterError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let vector = record
                .feature_vector()
                .ok_or_else(|| ClusterError::MissingFeature {
                    index,
                    name: record.name.clone(),
                    feature: record.missing_feature().unwrap_or(FeatureKind::Rating),
                })?;
            if !vector.is_finite() {
                return Err(ClusterError::NonFiniteFeature { index });
            }
            Ok(vector.0)
        })
        .collect()
}

/// Trains a model on `records`.
///
/// Fails if there are no records or any record lacks a clustering feature.
/// When there are fewer records than `config.k`, k is reduced to the record
/// count.
pub fn fit(records: &[PoiRecord], config: &ClusterConfig) -> Result<ClusterModel, ClusterError> {
    if records.is_empty() {
        return Err(ClusterError::EmptyDataset);
    }

    let raw = feature_matrix(records)?;
    let scaler = StandardScaler::fit(&raw);
    let points = scaler.transform_all(&raw);

    let k = config.k.max(1).min(points.len());
    if k < config.k {
        warn!(
            "Only {} records available; reducing k from {} to {}",
            points.len(),
            config.k,
            k
        );
    }

    let result = KMeans::fit(
        &points,
        &KMeansParams {
            k,
            n_init: config.n_init,
            max_iter: config.max_iter,
            tol: config.tol,
            seed: config.seed,
        },
    );

    info!(
        "Trained k-means model: k={}, n={}, inertia={:.4}, iterations={}",
        k,
        points.len(),
        result.inertia,
        result.iterations
    );

    Ok(ClusterModel {
        centroids: result.centroids,
        scaler,
        k,
        inertia: result.inertia,
        n_samples: points.len(),
        iterations: result.iterations,
        trained_at: Utc::now(),
    })
}

/// Labels every record with the model's nearest centroid.
///
/// Records lacking a feature cannot be placed and are skipped.
pub fn assign(records: &[PoiRecord], model: &ClusterModel) -> Vec<ClusteredRecord> {
    records
        .iter()
        .filter_map(|record| {
            let vector = record.feature_vector()?;
            Some(ClusteredRecord {
                cluster: model.predict(&vector),
                record: record.clone(),
            })
        })
        .collect()
}

/// Cluster label for a single feature vector.
pub fn predict_one(features: &FeatureVector, model: &ClusterModel) -> usize {
    model.predict(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: u32, population: u32, rating: f64) -> PoiRecord {
        PoiRecord {
            id: format!("B{}", i),
            name: format!("poi-{}", i),
            lng: 116.3 + i as f64 * 0.001,
            lat: 39.9,
            rating: Some(rating),
            price_level: Some((i % 4 + 1) as u8),
            surrounding_population: Some(population),
            competitors: Some(i % 15),
            transport: Some(0.5 + (i % 5) as f64 * 0.1),
            ..Default::default()
        }
    }

    fn sample_records() -> Vec<PoiRecord> {
        (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    record(i, 6000 + i * 10, 3.8)
                } else {
                    record(i, 45000 + i * 10, 4.9)
                }
            })
            .collect()
    }

    #[test]
    fn test_fit_rejects_empty() {
        let err = fit(&[], &ClusterConfig::default()).unwrap_err();
        assert_eq!(err, ClusterError::EmptyDataset);
    }

    #[test]
    fn test_fit_rejects_missing_feature() {
        let mut records = sample_records();
        records[3].competitors = None;

        let err = fit(&records, &ClusterConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ClusterError::MissingFeature {
                index: 3,
                feature: FeatureKind::Competitors,
                ..
            }
        ));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let records = sample_records();
        let config = ClusterConfig::default();

        let a = fit(&records, &config).unwrap();
        let b = fit(&records, &config).unwrap();

        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.inertia, b.inertia);

        let labels_a: Vec<usize> = assign(&records, &a).iter().map(|r| r.cluster).collect();
        let labels_b: Vec<usize> = assign(&records, &b).iter().map(|r| r.cluster).collect();
        assert_eq!(labels_a, labels_b);
    }

    #[test]
    fn test_k_is_clamped_to_sample_count() {
        let records: Vec<PoiRecord> = sample_records().into_iter().take(3).collect();
        let model = fit(&records, &ClusterConfig::default()).unwrap();

        assert_eq!(model.k, 3);
        assert_eq!(model.centroids.len(), 3);
        assert!(assign(&records, &model).iter().all(|r| r.cluster < 3));
    }

    #[test]
    fn test_predict_one_in_range() {
        let model = fit(&sample_records(), &ClusterConfig::default()).unwrap();
        let v = FeatureVector::new(20000.0, 5.0, 0.7, 4.2, 2.0);
        assert!(predict_one(&v, &model) < model.k);
    }

    #[test]
    fn test_assign_matches_predict() {
        let records = sample_records();
        let model = fit(&records, &ClusterConfig::default()).unwrap();

        for clustered in assign(&records, &model) {
            let v = clustered.record.feature_vector().unwrap();
            assert_eq!(clustered.cluster, predict_one(&v, &model));
        }
    }

    #[test]
    fn test_centroid_features_are_in_feature_units() {
        let records = sample_records();
        let model = fit(&records, &ClusterConfig::new().with_k(2)).unwrap();

        let c = model.centroid_features(0).unwrap();
        let population = c.get(FeatureKind::SurroundingPopulation).unwrap();
        assert!((5000.0..50000.0).contains(&population));
        assert!(model.centroid_features(2).is_none());
    }

    #[test]
    fn test_clustered_record_serializes_flat() {
        let records = sample_records();
        let model = fit(&records, &ClusterConfig::default()).unwrap();
        let json = serde_json::to_value(&assign(&records, &model)[0]).unwrap();

        assert!(json.get("name").is_some());
        assert!(json.get("cluster").is_some());
        assert!(json.get("record").is_none());
    }
}
