//! TTL cache store: LRU index over optional disk persistence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::disk::DiskStore;
use crate::cache::entry::CacheEntry;
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Result of a counted lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh(Arc<CacheEntry>),
    /// Expired but retained for stale-on-failure.
    Stale(Arc<CacheEntry>),
    Miss,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub write_failures: u64,
    pub disk_bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    write_failures: AtomicU64,
}

pub struct CacheStore {
    index: Mutex<LruCache<String, Arc<CacheEntry>>>,
    disk: Option<DiskStore>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    retain_stale: bool,
    counters: Counters,
}

impl CacheStore {
    /// Open the store described by `config`, loading persisted entries.
    ///
    /// A directory that cannot be created or read leaves the store memory-only.
    pub fn open(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let mut store = Self::in_memory(config.max_entries, clock);
        store.retain_stale = config.serve_stale_on_failure;
        if !config.enabled {
            tracing::info!("Cache persistence disabled, running memory-only");
            return store;
        }

        let disk = match DiskStore::open(&config.directory) {
            Ok(disk) => disk,
            Err(e) => {
                tracing::warn!(
                    directory = %config.directory,
                    error = %e,
                    "Cache directory unavailable, running memory-only"
                );
                return store;
            }
        };

        match disk.load_all(store.clock.now_millis()) {
            Ok(report) => {
                let loaded = report.entries.len();
                {
                    let mut index = store.lock_index();
                    for entry in report.entries {
                        index.put(entry.key.clone(), Arc::new(entry));
                    }
                    let evicted = store.shrink_to_capacity(&mut index);
                    Self::remove_files(&disk, &evicted);
                }
                tracing::info!(
                    directory = %config.directory,
                    loaded,
                    expired = report.expired,
                    corrupt = report.corrupt,
                    "Loaded cache entries from disk"
                );
            }
            Err(e) => {
                tracing::warn!(directory = %config.directory, error = %e, "Failed to scan cache directory");
            }
        }

        store.disk = Some(disk);
        metrics::record_cache_size(store.len());
        store
    }

    /// A store without persistence.
    pub fn in_memory(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            index: Mutex::new(LruCache::unbounded()),
            disk: None,
            clock,
            max_entries: max_entries.max(1),
            retain_stale: false,
            counters: Counters::default(),
        }
    }

    /// Keep expired entries on lookup so they can be served as stale.
    pub fn with_retain_stale(mut self, retain_stale: bool) -> Self {
        self.retain_stale = retain_stale;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    /// Fresh value for `key`, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self.lookup(key) {
            Lookup::Fresh(entry) => Some(entry.value.clone()),
            Lookup::Stale(_) | Lookup::Miss => None,
        }
    }

    /// Counted lookup. Expired entries are purged unless stale entries are retained.
    pub fn lookup(&self, key: &str) -> Lookup {
        let now = self.clock.now_millis();
        let lookup = {
            let mut index = self.lock_index();
            match index.get(key).cloned() {
                Some(entry) if entry.is_valid(now) => Lookup::Fresh(entry),
                Some(entry) if self.retain_stale => Lookup::Stale(entry),
                Some(_) => {
                    index.pop(key);
                    self.remove_file(key);
                    self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_eviction("expired");
                    Lookup::Miss
                }
                None => Lookup::Miss,
            }
        };

        match &lookup {
            Lookup::Fresh(_) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("hit");
            }
            Lookup::Stale(_) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("stale");
            }
            Lookup::Miss => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup("miss");
            }
        }
        lookup
    }

    /// Fresh entry for `key`, without counting or touching recency.
    pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now_millis();
        self.lock_index()
            .peek(key)
            .filter(|entry| entry.is_valid(now))
            .cloned()
    }

    /// Entry for `key` whether or not it has expired.
    pub fn peek_stale(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.lock_index().peek(key).cloned()
    }

    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        self.set_with_etag(key, value, ttl, None);
    }

    /// Insert or replace `key`, resetting its timestamp.
    ///
    /// File writes and deletes happen under the index lock, so the files on
    /// disk always match the index.
    pub fn set_with_etag(&self, key: &str, value: serde_json::Value, ttl: Duration, etag: Option<String>) {
        let entry = CacheEntry::new(key, value, self.clock.now_millis(), ttl.as_millis() as u64)
            .with_etag(etag);

        let size = {
            let mut index = self.lock_index();
            if let Some(disk) = &self.disk {
                if let Err(e) = disk.write(&entry) {
                    self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "Failed to persist cache entry");
                }
            }
            index.put(key.to_string(), Arc::new(entry));
            let evicted = self.shrink_to_capacity(&mut index);
            if let Some(disk) = &self.disk {
                Self::remove_files(disk, &evicted);
            }
            index.len()
        };
        metrics::record_cache_size(size);
    }

    /// Remove `key`. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let (removed, size) = {
            let mut index = self.lock_index();
            let removed = index.pop(key).is_some();
            self.remove_file(key);
            (removed, index.len())
        };
        metrics::record_cache_size(size);
        removed
    }

    /// Remove every entry. Returns the number removed from the index.
    pub fn clear(&self) -> usize {
        let count = {
            let mut index = self.lock_index();
            let count = index.len();
            index.clear();
            if let Some(disk) = &self.disk {
                disk.clear();
            }
            count
        };
        metrics::record_cache_size(0);
        tracing::info!(count, "Cleared cache");
        count
    }

    /// Purge every expired entry. Returns the number purged.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let (expired, size) = {
            let mut index = self.lock_index();
            let expired = Self::purge_expired(&mut index, now);
            if let Some(disk) = &self.disk {
                Self::remove_files(disk, &expired);
            }
            (expired, index.len())
        };

        if !expired.is_empty() {
            self.counters
                .expirations
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            tracing::debug!(purged = expired.len(), remaining = size, "Swept expired cache entries");
        }
        metrics::record_cache_size(size);
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            disk_bytes: self.disk.as_ref().map(DiskStore::total_bytes).unwrap_or(0),
        }
    }

    /// Bring the index within `max_entries`: expired entries go first, then
    /// least recently used ones. Returns removed keys.
    fn shrink_to_capacity(&self, index: &mut LruCache<String, Arc<CacheEntry>>) -> Vec<String> {
        if index.len() <= self.max_entries {
            return Vec::new();
        }

        let mut removed = Self::purge_expired(index, self.clock.now_millis());
        self.counters
            .expirations
            .fetch_add(removed.len() as u64, Ordering::Relaxed);

        while index.len() > self.max_entries {
            match index.pop_lru() {
                Some((key, _)) => {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_eviction("capacity");
                    removed.push(key);
                }
                None => break,
            }
        }
        removed
    }

    fn purge_expired(index: &mut LruCache<String, Arc<CacheEntry>>, now: u64) -> Vec<String> {
        let expired: Vec<String> = index
            .iter()
            .filter(|(_, entry)| !entry.is_valid(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            index.pop(key);
            metrics::record_cache_eviction("expired");
        }
        expired
    }

    /// Callers hold the index lock.
    fn remove_file(&self, key: &str) {
        if let Some(disk) = &self.disk {
            Self::remove_files(disk, &[key.to_string()]);
        }
    }

    /// Callers hold the index lock.
    fn remove_files(disk: &DiskStore, keys: &[String]) {
        for key in keys {
            if let Err(e) = disk.remove(key) {
                tracing::warn!(key = %key, error = %e, "Failed to remove cache file");
            }
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, LruCache<String, Arc<CacheEntry>>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::in_memory(CacheConfig::default().max_entries, Arc::new(SystemClock))
    }
}
