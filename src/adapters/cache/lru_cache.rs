use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::ports::cache::RecordCache;

const FALLBACK_CAPACITY: NonZeroUsize = NonZeroUsize::new(100).unwrap();

struct Entry {
    body: String,
    expires_at: Instant,
}

/// In-process LRU of serialized records with per-entry expiry.
pub struct LruRecordCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl LruRecordCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or_else(|| {
            tracing::warn!(
                fallback = FALLBACK_CAPACITY.get(),
                "Cache max_entries was 0, using fallback capacity"
            );
            FALLBACK_CAPACITY
        });
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Live and expired entries currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are replaced whole, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordCache for LruRecordCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        let expired = Instant::now() >= entries.peek(key)?.expires_at;
        if expired {
            entries.pop(key);
            tracing::debug!(key, "Cache entry expired");
            return None;
        }
        entries.get(key).map(|e| e.body.clone())
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.lock().put(
            key.to_string(),
            Entry {
                body: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}
