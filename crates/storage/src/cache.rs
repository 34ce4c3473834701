// storage/src/cache.rs

use dag_core::{Hash, Metadata, Record};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// LRU cache for records, fronting the RocksDB-backed store so repeated
/// verification-DAG walks don't round-trip through deserialization.
pub struct RecordCache {
    cache: RwLock<LruCache<Hash, Record>>,
}

impl RecordCache {
    pub fn new(capacity: usize) -> Self {
        Self { cache: RwLock::new(LruCache::new(capacity)) }
    }

    pub fn get(&self, hash: &Hash) -> Option<Record> {
        self.cache.write().unwrap().get(hash).cloned()
    }

    pub fn insert(&self, hash: Hash, record: Record) {
        self.cache.write().unwrap().insert(hash, record);
    }
}

/// LRU cache for metadata. Metadata changes far more often than records, so
/// callers must invalidate (re-insert) on every write rather than relying on
/// this to ever self-refresh.
pub struct MetadataCache {
    cache: RwLock<LruCache<Hash, Metadata>>,
}

impl MetadataCache {
    pub fn new(capacity: usize) -> Self {
        Self { cache: RwLock::new(LruCache::new(capacity)) }
    }

    pub fn get(&self, hash: &Hash) -> Option<Metadata> {
        self.cache.write().unwrap().get(hash).cloned()
    }

    pub fn insert(&self, hash: Hash, metadata: Metadata) {
        self.cache.write().unwrap().insert(hash, metadata);
    }

    pub fn invalidate(&self, hash: &Hash) {
        self.cache.write().unwrap().remove(hash);
    }
}

/// Simple LRU cache implementation
struct LruCache<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Clone + std::hash::Hash + Eq, V> LruCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self { map: HashMap::new(), order: VecDeque::new(), capacity }
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.order.retain(|k| k != key);
            self.order.push_front(key.clone());
            self.map.get(key)
        } else {
            None
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            if let Some(old_key) = self.order.pop_back() {
                self.map.remove(&old_key);
            }
        }
        self.order.retain(|k| k != &key);
        self.order.push_front(key.clone());
        self.map.insert(key, value);
    }

    fn remove(&mut self, key: &K) {
        self.order.retain(|k| k != key);
        self.map.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        Hash::new(bytes)
    }

    #[test]
    fn test_lru_cache_evicts_oldest() {
        let mut cache: LruCache<Hash, u32> = LruCache::new(2);
        cache.insert(h(1), 1);
        cache.insert(h(2), 2);
        assert_eq!(cache.get(&h(1)), Some(&1));

        cache.insert(h(3), 3);
        assert_eq!(cache.get(&h(2)), None);
        assert_eq!(cache.get(&h(1)), Some(&1));
        assert_eq!(cache.get(&h(3)), Some(&3));
    }

    #[test]
    fn test_record_cache_round_trips() {
        let cache = RecordCache::new(10);
        let record = Record::genesis_block(h(0), 1.0, 0);
        cache.insert(h(0), record.clone());
        assert_eq!(cache.get(&h(0)).unwrap().hash, record.hash);
    }
}
