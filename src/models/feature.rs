//! Business feature vectors and their provenance.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of features used for clustering.
pub const FEATURE_DIM: usize = 5;

/// Business features attached to a POI.
///
/// The first five variants, in declaration order, form the clustering
/// feature vector. `Popularity` is carried for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    SurroundingPopulation,
    Competitors,
    Transport,
    Rating,
    PriceLevel,
    Popularity,
}

impl FeatureKind {
    /// Features that make up a [`FeatureVector`], in column order.
    pub const CLUSTERING: [FeatureKind; FEATURE_DIM] = [
        FeatureKind::SurroundingPopulation,
        FeatureKind::Competitors,
        FeatureKind::Transport,
        FeatureKind::Rating,
        FeatureKind::PriceLevel,
    ];

    /// All business features, including display-only ones.
    pub const ALL: [FeatureKind; 6] = [
        FeatureKind::SurroundingPopulation,
        FeatureKind::Competitors,
        FeatureKind::Transport,
        FeatureKind::Rating,
        FeatureKind::PriceLevel,
        FeatureKind::Popularity,
    ];

    /// Column name used in the CSV dataset and JSON documents.
    pub fn column(&self) -> &'static str {
        match self {
            FeatureKind::SurroundingPopulation => "surrounding_population",
            FeatureKind::Competitors => "competitors",
            FeatureKind::Transport => "transport",
            FeatureKind::Rating => "rating",
            FeatureKind::PriceLevel => "price_level",
            FeatureKind::Popularity => "popularity",
        }
    }

    /// Parses a column name back into a feature.
    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.column() == name.trim())
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Records which business features of a POI were synthesized rather than
/// observed.
///
/// Serialized as a `|`-separated list of column names so it fits in a single
/// CSV cell, e.g. `"rating|price_level"`. An empty string means every value
/// is real.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FeatureProvenance {
    synthetic: u8,
}

impl FeatureProvenance {
    pub fn mark_synthetic(&mut self, kind: FeatureKind) {
        self.synthetic |= kind.bit();
    }

    pub fn is_synthetic(&self, kind: FeatureKind) -> bool {
        self.synthetic & kind.bit() != 0
    }

    /// True if any clustering feature is a placeholder value.
    pub fn has_synthetic_clustering_features(&self) -> bool {
        FeatureKind::CLUSTERING.iter().any(|k| self.is_synthetic(*k))
    }

    pub fn is_empty(&self) -> bool {
        self.synthetic == 0
    }

    /// Synthetic features in declaration order.
    pub fn synthetic_features(&self) -> Vec<FeatureKind> {
        FeatureKind::ALL
            .iter()
            .copied()
            .filter(|k| self.is_synthetic(*k))
            .collect()
    }
}

impl fmt::Display for FeatureProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .synthetic_features()
            .iter()
            .map(|k| k.column())
            .collect();
        f.write_str(&names.join("|"))
    }
}

impl Serialize for FeatureProvenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FeatureProvenance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let mut provenance = FeatureProvenance::default();
        for name in raw.split('|').filter(|s| !s.trim().is_empty()) {
            // Unknown names come from newer writers; ignore them.
            if let Some(kind) = FeatureKind::from_column(name) {
                provenance.mark_synthetic(kind);
            }
        }
        Ok(provenance)
    }
}

/// The clustering input for one location.
///
/// Order: surrounding_population, competitors, transport, rating, price_level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_DIM]);

impl FeatureVector {
    pub fn new(
        surrounding_population: f64,
        competitors: f64,
        transport: f64,
        rating: f64,
        price_level: f64,
    ) -> Self {
        Self([
            surrounding_population,
            competitors,
            transport,
            rating,
            price_level,
        ])
    }

    pub fn values(&self) -> &[f64; FEATURE_DIM] {
        &self.0
    }

    pub fn get(&self, kind: FeatureKind) -> Option<f64> {
        FeatureKind::CLUSTERING
            .iter()
            .position(|k| *k == kind)
            .map(|i| self.0[i])
    }

    /// Returns false if any component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl From<[f64; FEATURE_DIM]> for FeatureVector {
    fn from(values: [f64; FEATURE_DIM]) -> Self {
        Self(values)
    }
}
