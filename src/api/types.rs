//! API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clustering::ClusteredRecord;
use crate::models::{FeatureProvenance, FeatureVector};
use crate::services::{FetchStatus, JobCounts};

/// City used when a data request names none.
pub const DEFAULT_CITY: &str = "北京";

/// Keyword used when a data request names none.
pub const DEFAULT_KEYWORD: &str = "餐厅";

// ============================================================================
// Health Check
// ============================================================================

/// Health check response
#[derive(Serialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub components: HealthComponents,
}

/// Health status of individual components
#[derive(Serialize, Clone)]
pub struct HealthComponents {
    pub cache: bool,
    pub model: bool,
    pub provider: String,
}

// ============================================================================
// Stats
// ============================================================================

/// Statistics response
#[derive(Serialize)]
pub struct StatsResponse {
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub model: Option<ModelStats>,
    pub jobs: JobCounts,
}

/// Cache statistics
#[derive(Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub corrupt_removed: u64,
    pub evictions: u64,
    pub purged: u64,
    pub writes: u64,
}

/// Live model statistics
#[derive(Serialize)]
pub struct ModelStats {
    pub k: usize,
    pub n_samples: usize,
    pub inertia: f64,
    pub iterations: usize,
    pub trained_at: DateTime<Utc>,
    pub cluster_sizes: Vec<usize>,
    /// Records whose clustering features include placeholder values
    pub synthetic_records: usize,
}

// ============================================================================
// Clusters
// ============================================================================

/// One labelled location for the map view
#[derive(Serialize, Debug, Clone)]
pub struct ClusterPoint {
    pub name: String,
    pub address: String,
    pub lng: f64,
    pub lat: f64,
    pub rating: Option<f64>,
    pub price_level: Option<u8>,
    pub cluster: usize,
    pub synthetic: FeatureProvenance,
}

impl From<ClusteredRecord> for ClusterPoint {
    fn from(clustered: ClusteredRecord) -> Self {
        let record = clustered.record;
        Self {
            name: record.name,
            address: record.address,
            lng: record.lng,
            lat: record.lat,
            rating: record.rating,
            price_level: record.price_level,
            cluster: clustered.cluster,
            synthetic: record.synthetic,
        }
    }
}

// ============================================================================
// Predict
// ============================================================================

/// Features of a candidate location
#[derive(Deserialize, Debug)]
pub struct PredictRequest {
    /// Surrounding population
    pub population: f64,
    pub competitors: f64,
    /// Transport accessibility score
    pub transport: f64,
    pub rating: f64,
    pub price_level: f64,
}

impl PredictRequest {
    pub fn feature_vector(&self) -> FeatureVector {
        FeatureVector::new(
            self.population,
            self.competitors,
            self.transport,
            self.rating,
            self.price_level,
        )
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PredictResponse {
    pub cluster: usize,
}

// ============================================================================
// Data Refresh
// ============================================================================

/// Request to load POIs for a city; both fields are optional
#[derive(Deserialize, Debug, Default)]
pub struct GetDataRequest {
    pub city: Option<String>,
    pub keywords: Option<Vec<String>>,
}

impl GetDataRequest {
    pub fn city(&self) -> String {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CITY)
            .to_string()
    }

    pub fn keywords(&self) -> Vec<String> {
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .flatten()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            vec![DEFAULT_KEYWORD.to_string()]
        } else {
            keywords
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetDataResponse {
    pub status: FetchStatus,
    pub message: String,
    pub cache_key: String,
}

// ============================================================================
// Geocoding
// ============================================================================

#[derive(Deserialize, Debug)]
pub struct GeocodeRequest {
    pub address: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GeocodeResponse {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Deserialize, Debug)]
pub struct ReverseGeocodeRequest {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ReverseGeocodeResponse {
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_defaults() {
        let request: GetDataRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.city(), "北京");
        assert_eq!(request.keywords(), vec!["餐厅".to_string()]);
    }

    #[test]
    fn test_get_data_trims_and_drops_blank_keywords() {
        let request: GetDataRequest =
            serde_json::from_str(r#"{"city":" 上海 ","keywords":["咖啡", " ", "甜品 "]}"#)
                .unwrap();
        assert_eq!(request.city(), "上海");
        assert_eq!(request.keywords(), vec!["咖啡".to_string(), "甜品".to_string()]);
    }

    #[test]
    fn test_predict_request_requires_every_field() {
        let missing = serde_json::from_str::<PredictRequest>(
            r#"{"population":20000,"competitors":5,"transport":0.7,"rating":4.2}"#,
        );
        assert!(missing.is_err());

        let request: PredictRequest = serde_json::from_str(
            r#"{"population":20000,"competitors":5,"transport":0.7,"rating":4.2,"price_level":2}"#,
        )
        .unwrap();
        assert_eq!(
            request.feature_vector().values(),
            &[20000.0, 5.0, 0.7, 4.2, 2.0]
        );
    }
}
