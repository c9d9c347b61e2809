//! Disk-backed JSON document store with TTL expiry and size-bounded eviction.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheMetrics};
use super::entry::{
    age_of, lock_path_for, temp_path_for, CacheEntryInfo, DOCUMENT_EXT, LOCK_SUFFIX, TEMP_SUFFIX,
};
use super::error::{CacheError, CacheResult};
use super::key::file_stem;
use super::lock::EntryLock;

/// Outcome of a size check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// File stems of the entries removed, oldest first
    pub removed: Vec<String>,

    /// Bytes released
    pub bytes_freed: u64,

    /// Store size after eviction
    pub bytes_remaining: u64,
}

impl EvictionReport {
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
    }
}

/// JSON document cache keyed by string, one file per key.
///
/// Every read and write of an entry holds that entry's advisory lock, and
/// writes go through a temp file plus rename so readers never see a
/// partially written document. All methods block; call them from
/// `spawn_blocking` inside async code.
pub struct DiskCache {
    config: CacheConfig,

    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    corrupt_removed: AtomicU64,
    evictions: AtomicU64,
    purged: AtomicU64,
    writes: AtomicU64,
}

impl DiskCache {
    /// Opens (or creates) the cache directory
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        fs::create_dir_all(&config.cache_dir).map_err(|e| CacheError::io(&config.cache_dir, e))?;
        info!(
            "Disk cache at {:?} (ttl: {:?}, budget: {} bytes)",
            config.cache_dir, config.ttl, config.max_bytes
        );
        Ok(Self {
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            corrupt_removed: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            purged: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Path of the document for `key`
    pub fn document_path(&self, key: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.{}", file_stem(key), DOCUMENT_EXT))
    }

    /// Gets a document.
    ///
    /// Returns `Ok(None)` when the entry is absent, older than the TTL, or not
    /// valid JSON. Invalid documents are deleted.
    pub fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.get_as::<Value>(key)
    }

    /// Gets a document and decodes it into `T`.
    ///
    /// A document that is not valid JSON for `T` counts as corrupt and is
    /// deleted, so the next write repopulates it.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let path = self.document_path(key);

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(self.miss(key, "absent")),
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        if age_of(modified) > self.config.ttl {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return Ok(self.miss(key, "expired"));
        }

        let lock = EntryLock::acquire(&lock_path_for(&path), key, self.config.lock_timeout)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                lock.remove()?;
                return Ok(self.miss(key, "removed"));
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(doc) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", key);
                Ok(Some(doc))
            }
            Err(e) => {
                warn!("Removing corrupt cache document {:?}: {}", path, e);
                remove_if_exists(&path)?;
                lock.remove()?;
                self.corrupt_removed.fetch_add(1, Ordering::Relaxed);
                Ok(self.miss(key, "corrupt"))
            }
        }
    }

    /// Writes a document, then enforces the size budget.
    pub fn put(&self, key: &str, document: &Value) -> CacheResult<EvictionReport> {
        self.put_as(key, document)
    }

    /// Serializes `document` and writes it atomically under the entry lock.
    pub fn put_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        document: &T,
    ) -> CacheResult<EvictionReport> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let path = self.document_path(key);

        fs::create_dir_all(&self.config.cache_dir)
            .map_err(|e| CacheError::io(&self.config.cache_dir, e))?;

        {
            let _lock = EntryLock::acquire(&lock_path_for(&path), key, self.config.lock_timeout)?;
            let temp = temp_path_for(&path);
            write_synced(&temp, &bytes)?;
            if let Err(e) = fs::rename(&temp, &path) {
                let _ = fs::remove_file(&temp);
                return Err(CacheError::io(&path, e));
            }
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Cached {} bytes for {}", bytes.len(), key);

        self.evict_if_over_budget()
    }

    /// Removes one entry and its lock file. Returns whether a document existed.
    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        let path = self.document_path(key);
        let lock = EntryLock::acquire(&lock_path_for(&path), key, self.config.lock_timeout)?;
        let existed = remove_if_exists(&path)?;
        lock.remove()?;
        Ok(existed)
    }

    /// Lists all documents currently in the store
    pub fn entries(&self) -> CacheResult<Vec<CacheEntryInfo>> {
        let dir = &self.config.cache_dir;
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(dir, e)),
        };

        Ok(read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| CacheEntryInfo::from_path(&entry.path()))
            .collect())
    }

    /// Total size of all documents in bytes
    pub fn total_size(&self) -> CacheResult<u64> {
        Ok(self.entries()?.iter().map(|e| e.size).sum())
    }

    /// Trims the store once it exceeds the byte budget.
    ///
    /// No-op while total size is at or under `max_bytes`. Otherwise deletes the
    /// oldest entries by mtime until the store is at or under
    /// `max_bytes * evict_target_ratio`.
    pub fn evict_if_over_budget(&self) -> CacheResult<EvictionReport> {
        let mut entries = self.entries()?;
        let total: u64 = entries.iter().map(|e| e.size).sum();

        if total <= self.config.max_bytes {
            return Ok(EvictionReport {
                bytes_remaining: total,
                ..Default::default()
            });
        }

        entries.sort_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.stem.cmp(&b.stem))
        });

        let target = self.config.evict_target_bytes();
        let mut report = EvictionReport {
            bytes_remaining: total,
            ..Default::default()
        };

        for entry in entries {
            if report.bytes_remaining <= target {
                break;
            }
            match remove_entry_files(&entry) {
                Ok(true) => {
                    report.bytes_remaining -= entry.size;
                    report.bytes_freed += entry.size;
                    report.removed.push(entry.stem);
                }
                Ok(false) => debug!("Skipping locked entry {:?} during eviction", entry.path),
                Err(e) => warn!("Failed to evict {:?}: {}", entry.path, e),
            }
        }

        self.evictions
            .fetch_add(report.removed.len() as u64, Ordering::Relaxed);
        info!(
            "Cache over budget ({} > {} bytes): evicted {} entries, {} bytes remain",
            total,
            self.config.max_bytes,
            report.removed.len(),
            report.bytes_remaining
        );

        Ok(report)
    }

    /// Deletes every entry older than the TTL, then any lock or temp file
    /// left without a document. Returns the number of entries removed.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for entry in self.entries()? {
            if !entry.is_expired(self.config.ttl) {
                continue;
            }
            match remove_entry_files(&entry) {
                Ok(true) => removed += 1,
                Ok(false) => debug!("Skipping locked entry {:?} during purge", entry.path),
                Err(e) => warn!("Failed to purge {:?}: {}", entry.path, e),
            }
        }

        self.purged.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            info!("Purged {} expired cache entries", removed);
        }

        let orphans = self.purge_orphans()?;
        if orphans > 0 {
            info!("Removed {} orphaned lock/temp files", orphans);
        }
        Ok(removed)
    }

    /// Deletes `*.json.lock` files whose document is gone and any
    /// `*.json.tmp` left by an interrupted write. Files whose lock is held
    /// are skipped. Returns the number of files deleted.
    pub fn purge_orphans(&self) -> CacheResult<usize> {
        let dir = &self.config.cache_dir;
        let paths: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(dir, e)),
        };

        let mut removed = 0;
        for path in paths {
            let Some((document, is_temp)) = companion_document(&path) else {
                continue;
            };
            // Already removed alongside an earlier temp file
            if !path.exists() {
                continue;
            }
            if !is_temp && document.exists() {
                continue;
            }

            // A writer holds the entry lock for the whole temp write + rename
            let Some(lock) = EntryLock::try_acquire(&lock_path_for(&document))? else {
                continue;
            };
            if is_temp && remove_if_exists(&path)? {
                removed += 1;
            }
            if document.exists() {
                continue;
            }
            if lock.remove()? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Snapshot of the hit, miss and removal counters
    pub fn stats(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            corrupt_removed: self.corrupt_removed.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn miss<T>(&self, key: &str, reason: &str) -> Option<T> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {} ({})", key, reason);
        None
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let mut file = File::create(path).map_err(|e| CacheError::io(path, e))?;
    file.write_all(bytes).map_err(|e| CacheError::io(path, e))?;
    file.sync_all().map_err(|e| CacheError::io(path, e))
}

/// Deletes a document and its lock file, unless a reader or writer holds the
/// lock. Returns false when the entry was skipped.
fn remove_entry_files(entry: &CacheEntryInfo) -> CacheResult<bool> {
    let Some(lock) = EntryLock::try_acquire(&entry.lock_path())? else {
        return Ok(false);
    };
    remove_if_exists(&entry.path)?;
    lock.remove()?;
    Ok(true)
}

/// Maps `<stem>.json.lock` or `<stem>.json.tmp` to `(<stem>.json, is_temp)`.
fn companion_document(path: &Path) -> Option<(PathBuf, bool)> {
    let name = path.file_name()?.to_str()?;
    let (stem, is_temp) = match name.strip_suffix(LOCK_SUFFIX) {
        Some(stem) => (stem, false),
        None => (name.strip_suffix(TEMP_SUFFIX)?, true),
    };
    let document = path.with_file_name(stem);
    if document.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
        return None;
    }
    Some((document, is_temp))
}

fn remove_if_exists(path: &Path) -> CacheResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::io(path, e)),
    }
}
