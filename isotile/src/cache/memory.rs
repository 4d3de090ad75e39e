//! In-memory cache with LRU eviction.

use crate::cache::{CacheStats, ChunkCache};
use crate::coord::ChunkPos;
use crate::source::ChunkData;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Entry in the memory cache.
#[derive(Debug)]
struct CacheEntry {
    data: Arc<ChunkData>,
    /// Tick of the last access, key into `Inner::recency`
    last_used: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ChunkPos, CacheEntry>,
    /// Access tick to key, oldest first
    recency: BTreeMap<u64, ChunkPos>,
    tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, pos: ChunkPos) -> bool {
        match self.entries.remove(&pos) {
            Some(entry) => {
                self.recency.remove(&entry.last_used);
                true
            }
            None => false,
        }
    }
}

/// Chunk cache holding at most `capacity` chunks.
///
/// The least recently used chunk is evicted when a new one arrives at a full
/// cache. A capacity of zero caches nothing.
#[derive(Debug)]
pub struct LruCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkCache for LruCache {
    fn get(&self, pos: ChunkPos) -> Option<Arc<ChunkData>> {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();

        let Some(entry) = inner.entries.get_mut(&pos) else {
            inner.stats.misses += 1;
            return None;
        };
        let old = std::mem::replace(&mut entry.last_used, tick);
        let data = Arc::clone(&entry.data);
        inner.recency.remove(&old);
        inner.recency.insert(tick, pos);
        inner.stats.hits += 1;
        Some(data)
    }

    fn put(&self, data: Arc<ChunkData>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let pos = data.pos;
        inner.remove(pos);

        while inner.entries.len() >= self.capacity {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
        }

        let tick = inner.next_tick();
        inner.entries.insert(
            pos,
            CacheEntry {
                data,
                last_used: tick,
            },
        );
        inner.recency.insert(tick, pos);
    }

    fn evict(&self, pos: ChunkPos) -> bool {
        self.inner.lock().remove(pos)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entry_count: inner.entries.len(),
            ..inner.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(x: i64) -> Arc<ChunkData> {
        Arc::new(ChunkData {
            pos: ChunkPos::new(x, 0),
            payload: vec![x as u8],
        })
    }

    #[test]
    fn test_lru_get_put() {
        let cache = LruCache::new(2);
        cache.put(chunk(1));
        assert_eq!(cache.get(ChunkPos::new(1, 0)).unwrap().payload, vec![1]);
        assert!(cache.get(ChunkPos::new(2, 0)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.put(chunk(1));
        cache.put(chunk(2));
        cache.get(ChunkPos::new(1, 0));
        cache.put(chunk(3));

        assert!(cache.get(ChunkPos::new(1, 0)).is_some());
        assert!(cache.get(ChunkPos::new(2, 0)).is_none());
        assert!(cache.get(ChunkPos::new(3, 0)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_replace_does_not_evict() {
        let cache = LruCache::new(2);
        cache.put(chunk(1));
        cache.put(chunk(2));
        cache.put(chunk(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_lru_evict_and_clear() {
        let cache = LruCache::new(4);
        cache.put(chunk(1));
        cache.put(chunk(2));
        assert!(cache.evict(ChunkPos::new(1, 0)));
        assert!(!cache.evict(ChunkPos::new(1, 0)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_zero_capacity() {
        let cache = LruCache::new(0);
        cache.put(chunk(1));
        assert!(cache.is_empty());
    }
}
