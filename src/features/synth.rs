//! Placeholder business features.
//!
//! Real rating/price/footfall data is not available from the place-search
//! API, so values are synthesized. Every synthesized value is flagged in the
//! record's [`FeatureProvenance`](crate::models::FeatureProvenance);
//! consumers should treat flagged values as low-confidence.

use rand::Rng;

use crate::models::{FeatureKind, PoiRecord};

/// Fills `kind` on `record` with a random plausible value if it is absent.
/// Returns true if a value was synthesized.
pub fn backfill_feature<R: Rng + ?Sized>(
    record: &mut PoiRecord,
    kind: FeatureKind,
    rng: &mut R,
) -> bool {
    if record.feature(kind).is_some() {
        return false;
    }

    match kind {
        FeatureKind::Rating => record.rating = Some(random_rating(rng)),
        FeatureKind::PriceLevel => record.price_level = Some(rng.gen_range(1..=4)),
        FeatureKind::SurroundingPopulation => {
            record.surrounding_population = Some(rng.gen_range(5000..50000))
        }
        FeatureKind::Competitors => record.competitors = Some(rng.gen_range(0..=14)),
        FeatureKind::Transport => record.transport = Some(random_transport(rng)),
        // Display-only; never required for clustering.
        FeatureKind::Popularity => return false,
    }

    record.synthetic.mark_synthetic(kind);
    true
}

/// Uniform in [3.5, 5.0], one decimal.
fn random_rating<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    round_to(rng.gen_range(3.5..=5.0), 1)
}

/// Uniform in [0.5, 1.0), two decimals. Rounding is capped so the upper
/// bound stays exclusive.
fn random_transport<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    round_to(rng.gen_range(0.5..1.0), 2).min(0.99)
}

const PROVIDER_RATINGS: [f64; 6] = [4.0, 4.2, 4.5, 4.7, 4.9, 3.8];
const PROVIDER_PRICE_LEVELS: [u8; 6] = [1, 2, 2, 3, 3, 4];
const PROVIDER_TRANSPORT: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

/// Attaches deterministic business features to freshly fetched POIs.
///
/// Values cycle through fixed patterns by position so a given fetch always
/// produces the same features. All of them are flagged synthetic, replacing
/// whatever the record held.
pub fn attach_provider_features(records: &mut [PoiRecord]) {
    for (i, record) in records.iter_mut().enumerate() {
        record.rating = Some(PROVIDER_RATINGS[i % PROVIDER_RATINGS.len()]);
        record.price_level = Some(PROVIDER_PRICE_LEVELS[i % PROVIDER_PRICE_LEVELS.len()]);
        record.popularity = Some(50 + 10 * (i % 15) as u32);
        record.surrounding_population = Some(5000 + 3000 * (i % 15) as u32);
        record.competitors = Some((i % 15) as u32);
        record.transport = Some(PROVIDER_TRANSPORT[i % PROVIDER_TRANSPORT.len()]);

        for kind in FeatureKind::ALL {
            record.synthetic.mark_synthetic(kind);
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
