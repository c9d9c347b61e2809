//! Per-entry advisory file locks.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use super::error::CacheError;

/// Poll interval while waiting for a contended lock.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exclusive lock on one cache entry, released on drop.
///
/// The lock file itself is left in place; [`remove`](Self::remove) deletes it
/// together with the document on expiry, eviction or corruption.
#[derive(Debug)]
pub struct EntryLock {
    file: File,
    path: PathBuf,
}

impl EntryLock {
    /// Acquires the lock at `path`, waiting at most `timeout`.
    pub fn acquire(path: &Path, key: &str, timeout: Duration) -> Result<Self, CacheError> {
        let file = open_lock_file(path)?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired cache lock {:?} after {:?}", path, start.elapsed());
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        warn!("Timed out after {:?} waiting for cache lock {:?}", waited, path);
                        return Err(CacheError::LockTimeout {
                            key: key.to_string(),
                            waited,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
    }

    /// Takes the lock only if nobody holds it. `Ok(None)` means contended.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, CacheError> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_contended(&e) => {
                debug!("Cache lock {:?} is held, skipping", path);
                Ok(None)
            }
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Unlinks the lock file while still holding it, then releases.
    ///
    /// Returns whether the file existed.
    pub fn remove(self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, CacheError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| CacheError::io(path, e))
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release cache lock {:?}: {}", self.path, e);
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.json.lock");

        let lock = EntryLock::acquire(&path, "k", Duration::from_millis(100)).unwrap();
        assert!(path.exists());
        drop(lock);

        // Re-acquirable once released
        EntryLock::acquire(&path, "k", Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn test_lock_times_out_when_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.json.lock");

        let holder = File::create(&path).unwrap();
        holder.lock_exclusive().unwrap();

        let err = EntryLock::acquire(&path, "k", Duration::from_millis(60)).unwrap_err();
        match err {
            CacheError::LockTimeout { key, waited } => {
                assert_eq!(key, "k");
                assert!(waited >= Duration::from_millis(60));
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }

        FileExt::unlock(&holder).unwrap();
    }

    #[test]
    fn test_try_acquire_reports_contention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.json.lock");

        let held = EntryLock::try_acquire(&path).unwrap().unwrap();

        // Locks are per open file, so a second open in this process contends
        assert!(EntryLock::try_acquire(&path).unwrap().is_none());
        drop(held);
        assert!(EntryLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_remove_unlinks_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.json.lock");

        let lock = EntryLock::acquire(&path, "k", Duration::from_millis(100)).unwrap();
        assert!(lock.remove().unwrap());
        assert!(!path.exists());
    }
}
