pub mod feature;
pub mod poi;

pub use feature::{FeatureKind, FeatureProvenance, FeatureVector, FEATURE_DIM};
pub use poi::{Coordinates, ParseCoordinatesError, PoiRecord};
