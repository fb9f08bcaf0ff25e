//! Concurrent key→(value, expiry) table.
//!
//! Shared by the coalescing cache and the idempotency fast tier. Reads are
//! lock-free with respect to each other; writes go through DashMap's entry
//! API so "insert only if absent" is a single atomic step. An expired entry
//! is a miss everywhere, whether or not a sweep has removed it yet.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct StoreEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> StoreEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self { value, expires_at: Instant::now() + ttl }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Result of an atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<V> {
    /// The value was inserted; the caller won the race.
    Inserted,
    /// A live entry already existed; carries a copy of it.
    Occupied(V),
}

/// Concurrent TTL table with atomic insert-if-absent.
pub struct KeyedStore<V> {
    entries: DashMap<String, StoreEntry<V>>,
}

impl<V: Clone> KeyedStore<V> {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Get a live value. An expired-but-unswept entry is a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone())
    }

    /// Unconditional write; supersedes any existing entry.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(key.into(), StoreEntry::new(value, ttl));
    }

    /// Atomically insert `value` unless a live entry for `key` exists.
    ///
    /// An expired occupant counts as absent and is replaced in the same
    /// atomic step, so a stale record can never block a new writer.
    pub fn insert_if_absent(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
    ) -> InsertOutcome<V> {
        let now = Instant::now();
        match self.entries.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    InsertOutcome::Occupied(occupied.get().value.clone())
                } else {
                    occupied.insert(StoreEntry::new(value, ttl));
                    InsertOutcome::Inserted
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(StoreEntry::new(value, ttl));
                InsertOutcome::Inserted
            },
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    /// Remove the entry only if the predicate holds for its current value.
    pub fn remove_if(&self, key: &str, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        self.entries.remove_if(key, |_, e| pred(&e.value)).map(|(_, e)| e.value)
    }

    /// Keep only entries whose key/value pass the predicate.
    pub fn retain(&self, mut pred: impl FnMut(&str, &V) -> bool) {
        self.entries.retain(|k, e| pred(k, &e.value));
    }

    /// Drop expired entries. Advisory cleanup only; `get` already treats
    /// expired entries as misses.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for KeyedStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn expired_entry_is_a_miss_before_sweep() {
        let store = KeyedStore::new();
        store.insert("k", 1u32, Duration::from_millis(5));
        assert_eq!(store.get("k"), Some(1));

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.get("k"), None);
        // entry still physically present until swept
        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn insert_if_absent_respects_live_occupant() {
        let store = KeyedStore::new();
        assert_eq!(store.insert_if_absent("k", 1u32, Duration::from_secs(10)), InsertOutcome::Inserted);
        assert_eq!(
            store.insert_if_absent("k", 2, Duration::from_secs(10)),
            InsertOutcome::Occupied(1)
        );
        assert_eq!(store.get("k"), Some(1));
    }

    #[test]
    fn insert_if_absent_replaces_expired_occupant() {
        let store = KeyedStore::new();
        store.insert("k", 1u32, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(store.insert_if_absent("k", 2, Duration::from_secs(10)), InsertOutcome::Inserted);
        assert_eq!(store.get("k"), Some(2));
    }

    #[test]
    fn concurrent_insert_if_absent_has_one_winner() {
        let store = Arc::new(KeyedStore::new());
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                matches!(
                    store.insert_if_absent("k", i, Duration::from_secs(10)),
                    InsertOutcome::Inserted
                )
            }));
        }
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(store.get("k").is_some());
    }

    #[test]
    fn remove_if_checks_predicate() {
        let store = KeyedStore::new();
        store.insert("k", 1u32, Duration::from_secs(10));
        assert_eq!(store.remove_if("k", |v| *v == 2), None);
        assert_eq!(store.get("k"), Some(1));
        assert_eq!(store.remove_if("k", |v| *v == 1), Some(1));
        assert_eq!(store.get("k"), None);
    }
}
