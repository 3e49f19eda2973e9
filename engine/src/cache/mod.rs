//! Context Cache
//!
//! Two-tier cache of assembled context text, keyed by resolved path.
//! Small entries live in a byte-budgeted in-memory LRU; entries above the
//! disk threshold go to a JSON-per-entry disk store when that tier is
//! enabled. Both tiers implement [`CacheStore`] and sit behind
//! [`ContextCache`].
//!
//! Entries are immutable. A `set` replaces the whole entry, so readers
//! holding an `Arc<CacheEntry>` never see a partially written value.
//!
//! Eviction order when the memory budget is exceeded: every expired entry
//! first, then least-recently-used entries until the new one fits.

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::config::CacheConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sdk::errors::EngineError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound for the configured TTL (one year)
const MAX_TTL_MINUTES: u64 = 60 * 24 * 365;

/// One cached context payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub content: Arc<str>,
    pub file_count: usize,
    pub total_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: &str, content: &str, file_count: usize, total_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            content: Arc::from(content),
            file_count,
            total_bytes,
            created_at: now,
            last_access_at: now,
        }
    }

    /// Bytes charged against the memory budget.
    pub fn size_bytes(&self) -> u64 {
        (self.key.len() + self.content.len()) as u64
    }

    /// TTL counts from creation, not from last access.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }

    /// Copy with a new access time. Content is shared, not copied.
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_access_at: now,
            ..self.clone()
        }
    }
}

/// What a store did while saving an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub stored: bool,
    pub evicted: usize,
    pub expired: usize,
}

/// Selects entries for bulk removal. Higher-ranked so a store can call it
/// on entries borrowed from its own map.
pub type EntryPredicate = dyn for<'a> Fn(&'a CacheEntry) -> bool + Send + Sync;

/// A cache tier.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Tier name used in logs
    fn name(&self) -> &'static str;

    async fn load(&self, key: &str) -> Result<Option<Arc<CacheEntry>>, EngineError>;

    async fn save(&self, entry: Arc<CacheEntry>) -> Result<StoreReport, EngineError>;

    async fn remove(&self, key: &str) -> Result<bool, EngineError>;

    /// Remove every entry the predicate selects, returning how many went.
    async fn remove_where(&self, predicate: &EntryPredicate) -> Result<usize, EngineError>;

    async fn len(&self) -> usize;
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub memory_entries: usize,
    pub memory_bytes: u64,
    pub disk_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Facade over the memory and disk tiers.
pub struct ContextCache {
    enabled: bool,
    ttl: Duration,
    disk_threshold: u64,
    memory: MemoryStore,
    disk: Option<Box<dyn CacheStore>>,
    counters: Counters,
}

impl ContextCache {
    /// Build from validated config. `cache_dir` must already be expanded.
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = Duration::minutes(config.ttl_minutes.min(MAX_TTL_MINUTES) as i64);
        let disk: Option<Box<dyn CacheStore>> = if config.disk_enabled {
            Some(Box::new(DiskStore::new(
                config.cache_dir.clone(),
                config.disk_budget_mb.saturating_mul(1024 * 1024),
                ttl,
            )))
        } else {
            None
        };
        let mut cache = Self::with_limits(
            config.memory_budget_mb.saturating_mul(1024 * 1024),
            ttl,
            disk,
            config.disk_threshold_bytes,
        );
        cache.enabled = config.enabled;
        cache
    }

    /// Build with explicit limits.
    pub fn with_limits(
        memory_budget_bytes: u64,
        ttl: Duration,
        disk: Option<Box<dyn CacheStore>>,
        disk_threshold: u64,
    ) -> Self {
        Self {
            enabled: true,
            ttl,
            disk_threshold,
            memory: MemoryStore::new(memory_budget_bytes, ttl),
            disk,
            counters: Counters::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a key. Expired entries count as a miss and are removed.
    pub async fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        if !self.enabled {
            return None;
        }

        if let Some(entry) = self.lookup(&self.memory, key).await {
            return self.hit(entry);
        }
        if let Some(disk) = &self.disk {
            if let Some(entry) = self.lookup(disk.as_ref(), key).await {
                return self.hit(entry);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {}", key);
        None
    }

    /// Store an entry, replacing any previous value for the key.
    pub async fn set(&self, key: &str, content: &str, file_count: usize, total_bytes: u64) {
        if !self.enabled {
            return;
        }

        let entry = Arc::new(CacheEntry::new(key, content, file_count, total_bytes));
        let large = entry.size_bytes() > self.disk_threshold;

        if let (true, Some(disk)) = (large, &self.disk) {
            match disk.save(Arc::clone(&entry)).await {
                Ok(report) if report.stored => {
                    self.record(report);
                    let _ = self.memory.remove(key).await;
                    debug!("Cached {} on disk ({} bytes)", key, entry.size_bytes());
                    return;
                }
                Ok(_) => debug!("Entry {} exceeds the disk budget, trying memory", key),
                Err(e) => warn!("Disk cache write failed, keeping {} in memory: {}", key, e),
            }
        }

        match self.memory.save(entry).await {
            Ok(report) => {
                self.record(report);
                if !report.stored {
                    warn!("Entry {} is larger than the memory budget; not cached", key);
                }
            }
            Err(e) => warn!("Memory cache write failed for {}: {}", key, e),
        }

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(key).await {
                warn!("Could not drop stale disk entry {}: {}", key, e);
            }
        }
    }

    /// Remove one key from both tiers.
    pub async fn delete(&self, key: &str) -> bool {
        let mut removed = self.memory.remove(key).await.unwrap_or(false);
        if let Some(disk) = &self.disk {
            match disk.remove(key).await {
                Ok(found) => removed |= found,
                Err(e) => warn!("Disk cache delete failed for {}: {}", key, e),
            }
        }
        removed
    }

    /// `None` clears everything; `Some(prefix)` removes keys for that path
    /// and everything below it.
    pub async fn clear(&self, tag: Option<&str>) -> usize {
        let prefix = tag.map(str::to_string);
        let predicate = move |entry: &CacheEntry| match &prefix {
            Some(prefix) => key_is_under(&entry.key, prefix),
            None => true,
        };
        self.remove_matching(&predicate).await
    }

    /// Drop every expired entry from both tiers.
    pub async fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let now = Utc::now();
        let predicate = move |entry: &CacheEntry| entry.is_expired(ttl, now);
        let removed = self.remove_matching(&predicate).await;
        self.counters
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let memory_entries = self.memory.len().await;
        let disk_entries = match &self.disk {
            Some(disk) => disk.len().await,
            None => 0,
        };
        let lookups = hits + misses;

        CacheStats {
            entries: memory_entries + disk_entries,
            memory_entries,
            memory_bytes: self.memory.used_bytes(),
            disk_entries,
            hits,
            misses,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    async fn lookup(&self, store: &dyn CacheStore, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = match store.load(key).await {
            Ok(found) => found?,
            Err(e) => {
                warn!("{} cache read failed for {}: {}", store.name(), key, e);
                return None;
            }
        };

        if entry.is_expired(self.ttl, Utc::now()) {
            if let Err(e) = store.remove(key).await {
                warn!("Could not drop expired entry {}: {}", key, e);
            }
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            debug!("Cache entry {} expired", key);
            return None;
        }
        Some(entry)
    }

    fn hit(&self, entry: Arc<CacheEntry>) -> Option<Arc<CacheEntry>> {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        debug!("Cache hit for {}", entry.key);
        Some(entry)
    }

    fn record(&self, report: StoreReport) {
        self.counters
            .evictions
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.counters
            .expirations
            .fetch_add(report.expired as u64, Ordering::Relaxed);
    }

    async fn remove_matching(&self, predicate: &EntryPredicate) -> usize {
        let mut removed = self.memory.remove_where(predicate).await.unwrap_or(0);
        if let Some(disk) = &self.disk {
            match disk.remove_where(predicate).await {
                Ok(count) => removed += count,
                Err(e) => warn!("Disk cache sweep failed: {}", e),
            }
        }
        removed
    }
}

/// Whether `key` belongs to `prefix` as a whole path: the prefix must end
/// at a component boundary, a `/` or the `#` that starts the role suffix.
fn key_is_under(key: &str, prefix: &str) -> bool {
    let boundary = |c: char| c == '/' || c == '#';
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with(boundary) || rest.starts_with(boundary),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_cache(budget: u64) -> ContextCache {
        ContextCache::with_limits(budget, Duration::minutes(120), None, u64::MAX)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = memory_cache(1024 * 1024);
        cache.set("/repo/src", "<file>a</file>", 1, 14).await;

        let entry = cache.get("/repo/src").await.unwrap();
        assert_eq!(&*entry.content, "<file>a</file>");
        assert_eq!(entry.file_count, 1);
        assert_eq!(entry.total_bytes, 14);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_set_replaces_wholesale() {
        let cache = memory_cache(1024 * 1024);
        cache.set("k", "old", 1, 3).await;
        let before = cache.get("k").await.unwrap();
        cache.set("k", "new", 2, 3).await;

        // Readers keep the value they already hold
        assert_eq!(&*before.content, "old");
        assert_eq!(&*cache.get("k").await.unwrap().content, "new");
        assert_eq!(cache.stats().await.memory_entries, 1);
    }

    #[tokio::test]
    async fn test_budget_evicts_least_recently_used() {
        // Each entry is 1 (key) + 100 (content) bytes
        let cache = memory_cache(250);
        let body = "x".repeat(100);
        cache.set("a", &body, 1, 100).await;
        cache.set("b", &body, 1, 100).await;
        assert!(cache.get("a").await.is_some());
        cache.set("c", &body, 1, 100).await;

        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_not_cached() {
        let cache = memory_cache(10);
        cache.set("big", &"y".repeat(64), 1, 64).await;
        assert!(cache.get("big").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = ContextCache::with_limits(1024, Duration::milliseconds(20), None, u64::MAX);
        cache.set("k", "v", 1, 1).await;
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        assert!(cache.get("k").await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_delete_and_clear_by_prefix() {
        let cache = memory_cache(1024 * 1024);
        cache.set("/repo/a", "1", 1, 1).await;
        cache.set("/repo/b", "2", 1, 1).await;
        cache.set("/other/c", "3", 1, 1).await;

        assert!(cache.delete("/repo/a").await);
        assert!(!cache.delete("/repo/a").await);
        assert_eq!(cache.clear(Some("/repo")).await, 1);
        assert!(cache.get("/other/c").await.is_some());
        assert_eq!(cache.clear(None).await, 1);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_clear_stops_at_path_boundary() {
        let cache = memory_cache(1024 * 1024);
        cache.set("/repo/a#debugger", "1", 1, 1).await;
        cache.set("/repo/a/src#debugger", "2", 1, 1).await;
        cache.set("/repo/ab#debugger", "3", 1, 1).await;

        assert_eq!(cache.clear(Some("/repo/a")).await, 2);
        assert!(cache.get("/repo/ab#debugger").await.is_some());
        assert!(cache.get("/repo/a#debugger").await.is_none());
    }

    #[test]
    fn test_key_is_under() {
        assert!(key_is_under("/repo/a#debugger", "/repo/a"));
        assert!(key_is_under("/repo/a/x#debugger", "/repo/a"));
        assert!(key_is_under("/repo/a/x#debugger", "/repo/"));
        assert!(key_is_under("/repo/a", "/repo/a"));
        assert!(!key_is_under("/repo/ab#debugger", "/repo/a"));
        assert!(!key_is_under("/other#debugger", "/repo"));
    }

    #[tokio::test]
    async fn test_expired_disk_entries_are_swept() {
        let temp = TempDir::new().unwrap();
        let ttl = Duration::milliseconds(500);
        let disk: Box<dyn CacheStore> =
            Box::new(DiskStore::new(temp.path().to_path_buf(), u64::MAX, ttl));
        let cache = ContextCache::with_limits(1024, ttl, Some(disk), 16);

        let body = "w".repeat(200);
        for i in 0..20 {
            cache.set(&format!("/repo/{}#debugger", i), &body, 1, 200).await;
        }
        assert_eq!(cache.stats().await.disk_entries, 20);

        tokio::time::sleep(std::time::Duration::from_millis(800)).await;
        for i in 20..23 {
            cache.set(&format!("/repo/{}#debugger", i), &body, 1, 200).await;
        }

        let stats = cache.stats().await;
        assert_eq!(stats.disk_entries, 3);
        assert!(stats.expirations >= 20);
    }

    #[tokio::test]
    async fn test_large_entries_go_to_disk() {
        let temp = TempDir::new().unwrap();
        let disk: Box<dyn CacheStore> = Box::new(DiskStore::new(
            temp.path().to_path_buf(),
            u64::MAX,
            Duration::minutes(5),
        ));
        let cache = ContextCache::with_limits(1024 * 1024, Duration::minutes(5), Some(disk), 32);

        cache.set("small", "tiny", 1, 4).await;
        cache.set("large", &"z".repeat(100), 3, 100).await;

        let stats = cache.stats().await;
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.disk_entries, 1);

        let large = cache.get("large").await.unwrap();
        assert_eq!(large.file_count, 3);
        assert_eq!(large.content.len(), 100);
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = ContextCache::new(&config);
        cache.set("k", "v", 1, 1).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let cache = memory_cache(1024);
        cache.set("k", "v", 1, 1).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats().await;
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}
