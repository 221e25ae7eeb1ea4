use crate::clock::DynClock;
use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_access: Instant,
}

/// A map whose entries expire once they have not been accessed for
/// `timeout`, as measured by the injected clock.
///
/// Expired entries are only dropped by [KeyCache::sweep]. Until then
/// [KeyCache::get] treats them as absent.
#[derive(Debug)]
pub struct KeyCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    timeout: Duration,
    clock: DynClock,
}

impl<K: Eq + Hash, V: Clone> KeyCache<K, V> {
    pub fn new(timeout: Duration, clock: DynClock) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
            clock,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entries.get_mut(key)?;
        if now.duration_since(entry.last_access) > self.timeout {
            return None;
        }
        entry.last_access = now;
        Some(entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        let last_access = self.clock.now();
        self.entries.insert(key, Entry { value, last_access });
    }

    /// Drop all expired entries, returning how many were dropped.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            now.duration_since(entry.last_access) <= self.timeout
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
