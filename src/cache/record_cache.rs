use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::chain::{QuestId, QuestRecord};

/// Thread-safe LRU cache for quest records
///
/// Shared across requests, so every entry carries an insertion time and is
/// treated as a miss once older than `ttl`. Staleness is bounded by `ttl`.
pub struct RecordCache {
    cache: Mutex<LruCache<QuestId, (Instant, QuestRecord)>>,
    ttl: Duration,
}

impl RecordCache {
    /// Create a new record cache
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of records to keep (clamped to at least 1)
    /// * `ttl` - Maximum age of a served entry
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<QuestId, (Instant, QuestRecord)>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh cached record, if any. Expired entries are evicted on access.
    pub fn get(&self, id: QuestId) -> Option<QuestRecord> {
        let mut cache = self.lock();
        let (stored_at, record) = cache.get(&id).cloned()?;
        if stored_at.elapsed() <= self.ttl {
            return Some(record);
        }
        cache.pop(&id);
        None
    }

    pub fn put(&self, record: QuestRecord) {
        self.lock().put(record.id, (Instant::now(), record));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
