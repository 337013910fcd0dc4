//! Per-account `seenMessageIds` dedup cache (spec §4.6, §9 "idempotency
//! two-layer"). Keyed by the source platform's native message ID, this
//! is the fast, in-memory rejection layer; the store's CID idempotency
//! (spec §4.5) is the durable layer underneath it. Dropping either layer
//! causes observable duplication or unnecessary disk traffic — both
//! layers are kept deliberately.

use std::hash::Hash;
use std::sync::Mutex;

use lru::LruCache;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded, thread-safe "have we seen this native ID before" cache.
/// Bounded (rather than an ever-growing `HashSet`) so a long-lived
/// service doesn't leak memory across a multi-year archive.
pub struct SeenIdCache<K: Eq + Hash> {
    inner: Mutex<LruCache<K, ()>>,
}

impl<K: Eq + Hash> SeenIdCache<K> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Record `id` as seen and report whether it was already present.
    /// A repeat is silently dropped by the caller before CID computation
    /// (spec §4.6).
    pub fn check_and_insert(&self, id: K) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.contains(&id) {
            true
        } else {
            guard.put(id, ());
            false
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> Default for SeenIdCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new_second_is_repeat() {
        let cache: SeenIdCache<String> = SeenIdCache::new();
        assert!(!cache.check_and_insert("native-1".to_string()));
        assert!(cache.check_and_insert("native-1".to_string()));
    }

    #[test]
    fn bounded_capacity_evicts_oldest() {
        let cache: SeenIdCache<u32> = SeenIdCache::with_capacity(2);
        assert!(!cache.check_and_insert(1));
        assert!(!cache.check_and_insert(2));
        assert!(!cache.check_and_insert(3)); // evicts 1
        assert!(!cache.check_and_insert(1)); // 1 was evicted, looks new again
    }
}
