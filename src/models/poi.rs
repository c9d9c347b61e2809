//! Point-of-interest records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::feature::{FeatureKind, FeatureProvenance, FeatureVector};

/// WGS-84 / GCJ-02 longitude-latitude pair as returned by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinates {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Formats as the provider's `"lng,lat"` wire form.
impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lng, self.lat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid coordinates: {0:?}")]
pub struct ParseCoordinatesError(pub String);

impl FromStr for Coordinates {
    type Err = ParseCoordinatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lng, lat) = s
            .split_once(',')
            .ok_or_else(|| ParseCoordinatesError(s.to_string()))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|_| ParseCoordinatesError(s.to_string()))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| ParseCoordinatesError(s.to_string()))?;
        if !lng.is_finite() || !lat.is_finite() {
            return Err(ParseCoordinatesError(s.to_string()));
        }
        Ok(Self { lng, lat })
    }
}

/// A POI with its location and business features.
///
/// Field names follow the provider's column names so that datasets written
/// by older tooling load unchanged. Business features are optional until the
/// feature pipeline has backfilled them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PoiRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub category: String,
    #[serde(default)]
    pub typecode: String,
    #[serde(default)]
    pub address: String,
    pub lng: f64,
    pub lat: f64,
    #[serde(rename = "tel", default)]
    pub phone: String,
    #[serde(rename = "pname", default)]
    pub province: String,
    #[serde(rename = "cityname", default)]
    pub city: String,
    #[serde(rename = "adname", default)]
    pub district: String,
    #[serde(default)]
    pub business_area: String,

    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub surrounding_population: Option<u32>,
    #[serde(default)]
    pub competitors: Option<u32>,
    #[serde(default)]
    pub transport: Option<f64>,

    /// Which of the features above are placeholders.
    #[serde(default)]
    pub synthetic: FeatureProvenance,
}

impl PoiRecord {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lng, self.lat)
    }

    /// Returns the value of a business feature as `f64`, if present.
    pub fn feature(&self, kind: FeatureKind) -> Option<f64> {
        match kind {
            FeatureKind::SurroundingPopulation => self.surrounding_population.map(f64::from),
            FeatureKind::Competitors => self.competitors.map(f64::from),
            FeatureKind::Transport => self.transport,
            FeatureKind::Rating => self.rating,
            FeatureKind::PriceLevel => self.price_level.map(f64::from),
            FeatureKind::Popularity => self.popularity.map(f64::from),
        }
    }

    /// The first clustering feature this record lacks, if any.
    pub fn missing_feature(&self) -> Option<FeatureKind> {
        FeatureKind::CLUSTERING
            .iter()
            .copied()
            .find(|k| self.feature(*k).is_none())
    }

    /// Extracts the clustering vector. `None` if any feature is absent.
    pub fn feature_vector(&self) -> Option<FeatureVector> {
        Some(FeatureVector::new(
            self.feature(FeatureKind::SurroundingPopulation)?,
            self.feature(FeatureKind::Competitors)?,
            self.feature(FeatureKind::Transport)?,
            self.feature(FeatureKind::Rating)?,
            self.feature(FeatureKind::PriceLevel)?,
        ))
    }

    /// True once every clustering feature is present.
    pub fn is_complete(&self) -> bool {
        self.missing_feature().is_none()
    }
}
