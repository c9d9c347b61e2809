//! Working dataset: CSV load, cleaning, column backfill and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{FeatureKind, FeatureProvenance, PoiRecord};

use super::synth::backfill_feature;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),
}

/// Records loaded from the working dataset plus what the loader did to them.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<PoiRecord>,

    /// Rows removed by coordinate cleaning
    pub dropped: usize,

    /// Feature columns absent from the source and synthesized wholesale
    pub backfilled_columns: Vec<FeatureKind>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<PoiRecord> {
        self.records
    }
}

/// One CSV row as written by this crate or by older tooling. Unknown
/// columns (`location`, `photos`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    category: String,
    #[serde(default)]
    typecode: String,
    #[serde(default)]
    address: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    lng: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    lat: Option<f64>,
    #[serde(default)]
    tel: String,
    #[serde(default)]
    pname: String,
    #[serde(default)]
    cityname: String,
    #[serde(default)]
    adname: String,
    #[serde(default)]
    business_area: String,

    // Numeric features are read as floats: pandas writes integer columns
    // containing gaps as "2.0".
    #[serde(default, deserialize_with = "csv::invalid_option")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price_level: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    popularity: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    surrounding_population: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    competitors: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    transport: Option<f64>,

    #[serde(default)]
    synthetic: FeatureProvenance,
}

impl RawRow {
    /// Converts to a record, or None if coordinates are missing.
    fn into_record(self) -> Option<PoiRecord> {
        let lng = self.lng.filter(|v| v.is_finite())?;
        let lat = self.lat.filter(|v| v.is_finite())?;

        Some(PoiRecord {
            id: self.id,
            name: self.name,
            category: self.category,
            typecode: self.typecode,
            address: self.address,
            lng,
            lat,
            phone: self.tel,
            province: self.pname,
            city: self.cityname,
            district: self.adname,
            business_area: self.business_area,
            rating: self.rating.filter(|v| v.is_finite()),
            price_level: to_integer(self.price_level),
            popularity: to_integer(self.popularity),
            surrounding_population: to_integer(self.surrounding_population),
            competitors: to_integer(self.competitors),
            transport: self.transport.filter(|v| v.is_finite()),
            synthetic: self.synthetic,
        })
    }
}

fn to_integer<T: TryFrom<i64>>(value: Option<f64>) -> Option<T> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .and_then(|v| T::try_from(v.round() as i64).ok())
}

/// Loads the working dataset, returning an empty dataset on any error.
///
/// Missing feature values are synthesized with thread-local randomness.
pub fn load(path: &Path) -> Dataset {
    load_with_rng(path, &mut rand::thread_rng())
}

/// [`load`] with a caller-supplied RNG for the synthesized values.
pub fn load_with_rng<R: Rng + ?Sized>(path: &Path, rng: &mut R) -> Dataset {
    match try_load(path, rng) {
        Ok(dataset) => dataset,
        Err(e) => {
            warn!("Failed to load dataset {:?}: {}", path, e);
            Dataset::default()
        }
    }
}

/// Loads, cleans and backfills the dataset at `path`.
///
/// Any I/O or parse error fails the whole load; partial results are never
/// returned.
pub fn try_load<R: Rng + ?Sized>(path: &Path, rng: &mut R) -> Result<Dataset, DatasetError> {
    let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // Files written by spreadsheet tools often carry a UTF-8 BOM.
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let absent: Vec<FeatureKind> = FeatureKind::CLUSTERING
        .iter()
        .copied()
        .filter(|kind| !headers.iter().any(|h| h == kind.column()))
        .collect();

    let mut rows = Vec::new();
    for row in reader.deserialize::<RawRow>() {
        rows.push(row?);
    }

    let total = rows.len();
    let records = clean(rows.into_iter().filter_map(RawRow::into_record).collect());
    let dropped = total - records.len();
    if dropped > 0 {
        debug!("Dropped {} rows with missing or invalid coordinates", dropped);
    }

    let mut dataset = Dataset {
        records,
        dropped,
        backfilled_columns: absent,
    };
    backfill(&mut dataset, rng);

    info!("Loaded {} records from {:?}", dataset.len(), path);
    Ok(dataset)
}

/// Drops records whose longitude is not strictly positive.
pub fn clean(records: Vec<PoiRecord>) -> Vec<PoiRecord> {
    records
        .into_iter()
        .filter(|r| r.lng.is_finite() && r.lat.is_finite() && r.lng > 0.0)
        .collect()
}

/// Synthesizes every clustering feature the records lack.
///
/// Whole columns listed in `backfilled_columns` are logged once; isolated
/// gaps in present columns are filled quietly. Either way the value is
/// flagged synthetic on the record.
pub fn backfill<R: Rng + ?Sized>(dataset: &mut Dataset, rng: &mut R) {
    for kind in &dataset.backfilled_columns {
        warn!("Dataset lacks column '{}'; using synthetic values", kind);
    }

    let mut cells = 0usize;
    for record in &mut dataset.records {
        for kind in FeatureKind::CLUSTERING {
            if backfill_feature(record, kind, rng) {
                cells += 1;
            }
        }
    }

    if cells > 0 {
        debug!("Synthesized {} feature values", cells);
    }
}

/// Writes records as UTF-8 CSV, replacing `path` atomically.
pub fn write(path: &Path, records: &[PoiRecord]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    {
        let mut writer = csv::Writer::from_path(&temp)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush().map_err(|source| DatasetError::Io {
            path: temp.clone(),
            source,
        })?;
    }

    fs::rename(&temp, path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Wrote {} records to {:?}", records.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn write_csv(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("restaurants.csv");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_rating_column_is_backfilled_in_range() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "name,lng,lat,price_level,surrounding_population,competitors,transport\n\
             a,116.1,39.9,2,10000,3,0.7\n\
             b,116.2,39.8,3,20000,4,0.8\n\
             c,116.3,39.7,1,30000,5,0.9\n",
        );

        let dataset = try_load(&path, &mut rng()).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.backfilled_columns, vec![FeatureKind::Rating]);
        for r in &dataset.records {
            let rating = r.rating.unwrap();
            assert!((3.5..=5.0).contains(&rating));
            assert!(r.synthetic.is_synthetic(FeatureKind::Rating));
            assert!(!r.synthetic.is_synthetic(FeatureKind::Transport));
        }
    }

    #[test]
    fn test_cleaning_drops_bad_coordinates() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "name,lng,lat\n\
             ok,116.1,39.9\n\
             no_lng,,39.9\n\
             no_lat,116.1,\n\
             zero,0,39.9\n\
             west,-73.9,40.7\n\
             junk,abc,39.9\n",
        );

        let dataset = try_load(&path, &mut rng()).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records[0].name, "ok");
        assert_eq!(dataset.dropped, 5);
        assert!(dataset.records[0].is_complete());
    }

    #[test]
    fn test_empty_cell_in_present_column_is_backfilled() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "name,lng,lat,rating,price_level,surrounding_population,competitors,transport\n\
             a,116.1,39.9,,2.0,10000,3,0.7\n",
        );

        let dataset = try_load(&path, &mut rng()).unwrap();
        let r = &dataset.records[0];

        assert!(dataset.backfilled_columns.is_empty());
        assert_eq!(r.price_level, Some(2));
        assert!(r.synthetic.is_synthetic(FeatureKind::Rating));
        assert!(!r.synthetic.is_synthetic(FeatureKind::PriceLevel));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let dataset = load(&dir.path().join("absent.csv"));
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "name,lng,lat\na,116.1,39.9\nb,116.2\n");

        assert!(try_load(&path, &mut rng()).is_err());
        assert!(load_with_rng(&path, &mut rng()).is_empty());
    }

    #[test]
    fn test_bom_and_extra_columns_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "\u{feff}id,name,location,lng,lat,photos\nB1,a,\"116.1,39.9\",116.1,39.9,[]\n",
        );

        let dataset = try_load(&path, &mut rng()).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records[0].id, "B1");
    }

    #[test]
    fn test_write_then_load_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("restaurants.csv");

        let mut record = PoiRecord {
            id: "B0FFG1".to_string(),
            name: "海底捞".to_string(),
            category: "餐饮服务;中餐厅;火锅店".to_string(),
            address: "三里屯路19号".to_string(),
            lng: 116.455,
            lat: 39.937,
            rating: Some(4.7),
            price_level: Some(3),
            popularity: Some(80),
            surrounding_population: Some(17000),
            competitors: Some(3),
            transport: Some(0.8),
            ..Default::default()
        };
        record.synthetic.mark_synthetic(FeatureKind::Rating);

        write(&path, &[record.clone()]).unwrap();
        let dataset = try_load(&path, &mut rng()).unwrap();

        assert_eq!(dataset.records, vec![record]);
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
