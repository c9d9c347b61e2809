//! On-disk cache entry metadata.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Extension of cache documents.
pub const DOCUMENT_EXT: &str = "json";

/// Suffix appended to a document path to form its lock file path.
pub const LOCK_SUFFIX: &str = ".lock";

/// Suffix appended to a document path for in-progress writes.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Metadata for one cached document, read from the filesystem
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    /// File stem of the document (the key, or its hash for long keys)
    pub stem: String,

    /// Path to `<stem>.json`
    pub path: PathBuf,

    /// Document size in bytes
    pub size: u64,

    /// Last modification time; doubles as the write timestamp
    pub modified: SystemTime,
}

impl CacheEntryInfo {
    /// Reads metadata for a document path. Returns None for anything that
    /// is not a regular `*.json` file.
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
            return None;
        }
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        let stem = path.file_stem()?.to_str()?.to_string();
        Some(Self {
            stem,
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().ok()?,
        })
    }

    /// Returns the age of this entry. Entries stamped in the future are age zero.
    pub fn age(&self) -> Duration {
        age_of(self.modified)
    }

    /// Checks if this entry is older than the TTL
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Returns remaining TTL (None if expired)
    pub fn remaining_ttl(&self, ttl: Duration) -> Option<Duration> {
        ttl.checked_sub(self.age()).filter(|d| !d.is_zero())
    }

    /// Path of the companion lock file
    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }
}

/// Age of a timestamp relative to now, saturating at zero.
pub fn age_of(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}

/// `<document>.lock`
pub fn lock_path_for(document: &Path) -> PathBuf {
    append_suffix(document, LOCK_SUFFIX)
}

/// `<document>.tmp`
pub fn temp_path_for(document: &Path) -> PathBuf {
    append_suffix(document, TEMP_SUFFIX)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_companion_paths() {
        let doc = Path::new("/cache/abc.json");
        assert_eq!(lock_path_for(doc), PathBuf::from("/cache/abc.json.lock"));
        assert_eq!(temp_path_for(doc), PathBuf::from("/cache/abc.json.tmp"));
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k1.json");
        std::fs::write(&path, b"[1,2,3]").unwrap();

        let info = CacheEntryInfo::from_path(&path).unwrap();
        assert_eq!(info.stem, "k1");
        assert_eq!(info.size, 7);
        assert!(!info.is_expired(Duration::from_secs(60)));
        assert!(info.remaining_ttl(Duration::from_secs(60)).is_some());
    }

    #[test]
    fn test_from_path_ignores_non_documents() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("k1.json.lock");
        File::create(&lock).unwrap();
        assert!(CacheEntryInfo::from_path(&lock).is_none());
        assert!(CacheEntryInfo::from_path(&dir.path().join("missing.json")).is_none());
    }

    #[test]
    fn test_expired_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.json");
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        let info = CacheEntryInfo::from_path(&path).unwrap();
        assert!(info.is_expired(Duration::from_secs(3600)));
        assert!(info.remaining_ttl(Duration::from_secs(3600)).is_none());
    }
}
