use std::collections::HashMap;
use std::hash::Hash;

/// A bounded map evicting the least recently used entry.
///
/// Recency is a monotone stamp per touch; eviction scans for the minimum.
/// Caches here are small (hundreds of entries), so the scan beats the
/// bookkeeping of a linked order.
pub(crate) struct LruCache<K: Copy + Eq + Hash, V> {
    capacity: usize,
    stamp: u64,
    entries: HashMap<K, (u64, V)>,
}

impl<K: Copy + Eq + Hash, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            stamp: 0,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.stamp += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (stamp, _))| *stamp)
                .map(|(k, _)| *k)
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (self.stamp, value));
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.stamp += 1;
        let stamp = self.stamp;
        self.entries.get_mut(key).map(|entry| {
            entry.0 = stamp;
            &entry.1
        })
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
