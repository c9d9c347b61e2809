//! Feature pipeline: turns raw POI rows into clustering-ready records.
//!
//! - [`pipeline`] loads the working CSV dataset, cleans coordinates, backfills
//!   missing feature columns and writes the dataset back atomically
//! - [`synth`] produces the placeholder business features
//!
//! Every synthesized value is flagged in the record's `synthetic` column.

pub mod pipeline;
pub mod synth;

pub use pipeline::{backfill, clean, load, load_with_rng, try_load, write, Dataset, DatasetError};
pub use synth::{attach_provider_features, backfill_feature};
