//! Cache trait definition for dependency injection.

use crate::cache::CacheStats;
use crate::coord::ChunkPos;
use crate::source::{ChunkData, ChunkSource, SourceError};
use std::sync::Arc;

/// Cache abstraction for decoded chunks.
///
/// Lets the in-process LRU, a no-op cache, or an external cache be used
/// interchangeably by the renderer.
///
/// # Example
///
/// ```
/// use isotile::cache::{ChunkCache, LruCache};
/// use isotile::coord::ChunkPos;
/// use isotile::source::ChunkData;
/// use std::sync::Arc;
///
/// let cache = LruCache::new(16);
/// let pos = ChunkPos::new(0, 0);
/// cache.put(Arc::new(ChunkData { pos, payload: vec![1] }));
/// assert!(cache.get(pos).is_some());
/// ```
pub trait ChunkCache: Send {
    /// Returns the cached chunk, if present.
    fn get(&self, pos: ChunkPos) -> Option<Arc<ChunkData>>;

    /// Stores a chunk, evicting older entries if the cache is full.
    fn put(&self, data: Arc<ChunkData>);

    /// Drops one chunk. Returns true if it was cached.
    fn evict(&self, pos: ChunkPos) -> bool;

    /// Drops every entry.
    fn clear(&self);

    fn stats(&self) -> CacheStats;
}

/// Loads a chunk through a cache, filling it on a miss.
pub fn load_through(
    cache: &dyn ChunkCache,
    source: &dyn ChunkSource,
    pos: ChunkPos,
) -> Result<Arc<ChunkData>, SourceError> {
    if let Some(data) = cache.get(pos) {
        return Ok(data);
    }
    let data = source.load(pos)?;
    cache.put(Arc::clone(&data));
    Ok(data)
}

/// No-op cache implementation that never caches.
///
/// Always returns cache misses. Useful for tests that count source loads and
/// for low-memory runs.
#[derive(Debug, Clone, Default)]
pub struct NoOpCache;

impl NoOpCache {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkCache for NoOpCache {
    fn get(&self, _pos: ChunkPos) -> Option<Arc<ChunkData>> {
        None // Always miss
    }

    fn put(&self, _data: Arc<ChunkData>) {}

    fn evict(&self, _pos: ChunkPos) -> bool {
        false
    }

    fn clear(&self) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
