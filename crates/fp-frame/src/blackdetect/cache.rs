//! Black-interval cache keyed by file identity.
//!
//! Entries are keyed by (path, size, mtime) so a modified file misses
//! automatically. Expired entries are treated as absent and evicted lazily on
//! read and on every write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::BlackInterval;

/// Identity of a file at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ticks: u128,
}

impl CacheKey {
    /// Build a key from the file's current metadata.
    ///
    /// Returns `None` when the file cannot be stat'ed; such files are never
    /// cached.
    pub async fn for_file(path: &Path) -> Option<Self> {
        let meta = tokio::fs::metadata(path).await.ok()?;
        let mtime_ticks = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Some(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            mtime_ticks,
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    intervals: Vec<BlackInterval>,
    created_at: DateTime<Utc>,
}

/// Thread-safe cache for detected black intervals.
#[derive(Debug)]
pub struct BlackIntervalCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: chrono::Duration,
}

impl BlackIntervalCache {
    /// Create a cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    /// Create a cache with a TTL in hours.
    pub fn with_ttl_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours.saturating_mul(3600)))
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.created_at) < self.ttl
    }

    /// Fresh intervals for `key`, evicting the entry if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<BlackInterval>> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if self.is_fresh(entry, now) => Some(entry.intervals.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store intervals for `key`, evicting every expired entry first.
    pub fn insert(&self, key: CacheKey, intervals: Vec<BlackInterval>) {
        self.insert_at(key, intervals, Utc::now());
    }

    /// Store intervals with an explicit creation time.
    pub fn insert_at(&self, key: CacheKey, intervals: Vec<BlackInterval>, created_at: DateTime<Utc>) {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {evicted} expired black-interval cache entries");
        }
        entries.insert(
            key,
            CacheEntry {
                intervals,
                created_at,
            },
        );
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlackIntervalCache {
    fn default() -> Self {
        Self::with_ttl_hours(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str, size: u64, mtime: u128) -> CacheKey {
        CacheKey {
            path: PathBuf::from(path),
            size,
            mtime_ticks: mtime,
        }
    }

    fn intervals() -> Vec<BlackInterval> {
        vec![BlackInterval { start: 1.0, end: 2.0 }]
    }

    #[test]
    fn round_trip() {
        let cache = BlackIntervalCache::default();
        cache.insert(key("/a.mkv", 10, 5), intervals());
        assert_eq!(cache.get(&key("/a.mkv", 10, 5)), Some(intervals()));
    }

    #[test]
    fn changed_size_or_mtime_misses() {
        let cache = BlackIntervalCache::default();
        cache.insert(key("/a.mkv", 10, 5), intervals());
        assert_eq!(cache.get(&key("/a.mkv", 11, 5)), None);
        assert_eq!(cache.get(&key("/a.mkv", 10, 6)), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = BlackIntervalCache::default();
        let old = Utc::now() - chrono::Duration::hours(25);
        cache.insert_at(key("/a.mkv", 10, 5), intervals(), old);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("/a.mkv", 10, 5)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_evicted_on_write() {
        let cache = BlackIntervalCache::default();
        let old = Utc::now() - chrono::Duration::hours(30);
        cache.insert_at(key("/old.mkv", 1, 1), intervals(), old);
        cache.insert(key("/new.mkv", 2, 2), intervals());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("/new.mkv", 2, 2)).is_some());
    }

    #[test]
    fn zero_ttl_never_hits() {
        let cache = BlackIntervalCache::new(Duration::ZERO);
        cache.insert(key("/a.mkv", 10, 5), intervals());
        assert_eq!(cache.get(&key("/a.mkv", 10, 5)), None);
    }

    #[tokio::test]
    async fn key_tracks_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mkv");
        std::fs::write(&path, b"abc").unwrap();
        let first = CacheKey::for_file(&path).await.unwrap();
        assert_eq!(first.size, 3);

        std::fs::write(&path, b"abcdef").unwrap();
        let second = CacheKey::for_file(&path).await.unwrap();
        assert_ne!(first, second);

        assert!(CacheKey::for_file(&dir.path().join("missing.mkv")).await.is_none());
    }
}
