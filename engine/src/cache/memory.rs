use super::{CacheEntry, CacheStore, EntryPredicate, StoreReport};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use lru::LruCache;
use sdk::errors::EngineError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Byte-budgeted LRU tier.
///
/// The lock is only held for map operations and never across an await.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, Arc<CacheEntry>>>,
    used_bytes: AtomicU64,
    budget_bytes: u64,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(budget_bytes: u64, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            used_bytes: AtomicU64::new(0),
            budget_bytes,
            ttl,
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<CacheEntry>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, entry: &CacheEntry) {
        self.used_bytes
            .fetch_sub(entry.size_bytes(), Ordering::Relaxed);
    }

    /// Make room for `needed` bytes: expired entries go first, then the
    /// least recently used.
    fn make_room(
        &self,
        entries: &mut LruCache<String, Arc<CacheEntry>>,
        needed: u64,
        report: &mut StoreReport,
    ) {
        if self.used_bytes() + needed <= self.budget_bytes {
            return;
        }

        let now = Utc::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(entry) = entries.pop(&key) {
                self.release(&entry);
                report.expired += 1;
            }
        }

        while self.used_bytes() + needed > self.budget_bytes {
            match entries.pop_lru() {
                Some((_, entry)) => {
                    self.release(&entry);
                    report.evicted += 1;
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, key: &str) -> Result<Option<Arc<CacheEntry>>, EngineError> {
        let mut entries = self.lock();
        let Some(current) = entries.get(key).map(Arc::clone) else {
            return Ok(None);
        };
        let touched = Arc::new(current.touched(Utc::now()));
        entries.put(key.to_string(), Arc::clone(&touched));
        Ok(Some(touched))
    }

    async fn save(&self, entry: Arc<CacheEntry>) -> Result<StoreReport, EngineError> {
        let mut report = StoreReport::default();
        let size = entry.size_bytes();
        let mut entries = self.lock();

        if let Some(previous) = entries.pop(&entry.key) {
            self.release(&previous);
        }
        if size > self.budget_bytes {
            return Ok(report);
        }

        self.make_room(&mut entries, size, &mut report);
        entries.put(entry.key.clone(), entry);
        self.used_bytes.fetch_add(size, Ordering::Relaxed);
        report.stored = true;
        Ok(report)
    }

    async fn remove(&self, key: &str) -> Result<bool, EngineError> {
        let mut entries = self.lock();
        match entries.pop(key) {
            Some(entry) => {
                self.release(&entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_where(&self, predicate: &EntryPredicate) -> Result<usize, EngineError> {
        let mut entries = self.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| predicate(entry.as_ref()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            if let Some(entry) = entries.pop(key) {
                self.release(&entry);
            }
        }
        Ok(doomed.len())
    }

    async fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, body: &str) -> Arc<CacheEntry> {
        Arc::new(CacheEntry::new(key, body, 1, body.len() as u64))
    }

    #[tokio::test]
    async fn test_byte_accounting() {
        let store = MemoryStore::new(1024, Duration::minutes(1));
        store.save(entry("a", "1234")).await.unwrap();
        store.save(entry("b", "12")).await.unwrap();
        assert_eq!(store.used_bytes(), 5 + 3);

        store.save(entry("a", "1")).await.unwrap();
        assert_eq!(store.used_bytes(), 2 + 3);

        store.remove("b").await.unwrap();
        assert_eq!(store.used_bytes(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted_before_lru() {
        let store = MemoryStore::new(30, Duration::milliseconds(150));
        store.save(entry("old", "x".repeat(9).as_str())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        store.save(entry("mid", "x".repeat(9).as_str())).await.unwrap();

        // Touch "old" so it is the most recently used, yet it is expired
        store.load("old").await.unwrap();
        let report = store.save(entry("new", "x".repeat(9).as_str())).await.unwrap();

        assert!(report.stored);
        assert_eq!(report.expired, 1);
        assert_eq!(report.evicted, 0);
        assert!(store.load("mid").await.unwrap().is_some());
        assert!(store.load("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_updates_access_time() {
        let store = MemoryStore::new(1024, Duration::minutes(1));
        let saved = entry("k", "v");
        store.save(Arc::clone(&saved)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let loaded = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.created_at, saved.created_at);
        assert!(loaded.last_access_at > saved.last_access_at);
        assert!(Arc::ptr_eq(&loaded.content, &saved.content));
    }

    #[tokio::test]
    async fn test_remove_where_through_trait_object() {
        let store: Box<dyn CacheStore> = Box::new(MemoryStore::new(1024, Duration::minutes(1)));
        store.save(entry("/repo/a#debugger", "1")).await.unwrap();
        store.save(entry("/repo/b#debugger", "2")).await.unwrap();
        store.save(entry("/other/c#debugger", "3")).await.unwrap();

        let prefix = String::from("/repo/");
        let removed = store
            .remove_where(&move |entry: &CacheEntry| entry.key.starts_with(prefix.as_str()))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);
        assert!(store.load("/other/c#debugger").await.unwrap().is_some());
    }
}
