//! Memo table for pure model constructors keyed by their full argument tuple.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use super::{Distribution, InferenceError};

type Slot<V> = Arc<OnceCell<Arc<Distribution<V>>>>;

/// Hit/miss counters and number of published entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Stores computed distributions without eviction.
///
/// Each key owns a once-cell: concurrent callers asking for the same missing key block on a
/// single computation, and readers only ever observe fully built distributions. A failed
/// computation leaves the slot empty so the error is reported to every caller that retries.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    slots: RwLock<HashMap<K, Slot<V>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }
}

impl<K: Eq + Hash + Clone, V> MemoCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<Arc<Distribution<V>>> {
        self.slots
            .read()
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Return the cached distribution for `key`, computing and publishing it on a miss.
    pub fn get_or_try_insert_with<F>(
        &self,
        key: K,
        compute: F,
    ) -> Result<Arc<Distribution<V>>, InferenceError>
    where
        F: FnOnce() -> Result<Distribution<V>, InferenceError>,
    {
        let existing = self.slots.read().get(&key).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => Arc::clone(self.slots.write().entry(key).or_default()),
        };

        if let Some(value) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(value));
        }

        let mut computed = false;
        let value = slot.get_or_try_init(|| {
            computed = true;
            compute().map(Arc::new)
        })?;
        let counter = if computed { &self.misses } else { &self.hits };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(value))
    }

    /// Number of keys with a published distribution.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
