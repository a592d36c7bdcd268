//! Bounded keyed memo
//!
//! One fingerprint per key (e.g. per selected month or per date), bounded by
//! an LRU. Hits use `peek` so only (re)insertions refresh recency.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{CacheEntry, CacheStats, Equality};

pub struct KeyedMemo<K: Hash + Eq, I, O> {
    name: &'static str,
    entries: Mutex<LruCache<K, CacheEntry<I, O>>>,
    eq: Equality<I>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, I: Clone + PartialEq, O> KeyedMemo<K, I, O> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self::with_equality(name, capacity, <I as PartialEq>::eq)
    }
}

impl<K: Hash + Eq, I: Clone, O> KeyedMemo<K, I, O> {
    /// A zero capacity is raised to one entry
    pub fn with_equality(name: &'static str, capacity: usize, eq: Equality<I>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            eq,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_or_compute<F>(&self, key: K, inputs: &I, compute: F) -> Arc<O>
    where
        F: FnOnce(&I) -> O,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = entries.peek(&key) {
            if (self.eq)(&existing.inputs, inputs) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(node = self.name, "Keyed cache hit");
                return Arc::clone(&existing.result);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(node = self.name, entries = entries.len(), "Keyed cache miss, recomputing");

        let result = Arc::new(compute(inputs));
        entries.put(
            key,
            CacheEntry {
                inputs: inputs.clone(),
                result: Arc::clone(&result),
            },
        );
        result
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.pop(key);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name,
            hits: self.hits(),
            misses: self.misses(),
        }
    }
}
