//! In-memory chunk source.

use super::{ChunkData, ChunkSource, ChunkStamp, Mtime, SourceError, StampIter};
use crate::coord::ChunkPos;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Entry {
    mtime: Mtime,
    data: Option<Arc<ChunkData>>,
}

/// Chunk source backed by a map, for tests and embedding.
///
/// Chunks can be added or touched while the source is shared. A chunk
/// inserted with [`insert_corrupt`](Self::insert_corrupt) lists normally but
/// fails to load.
#[derive(Debug, Default)]
pub struct MemorySource {
    chunks: RwLock<BTreeMap<ChunkPos, Entry>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a chunk.
    pub fn insert(&self, pos: ChunkPos, mtime: Mtime, payload: Vec<u8>) {
        let data = Arc::new(ChunkData { pos, payload });
        self.chunks.write().insert(
            pos,
            Entry {
                mtime,
                data: Some(data),
            },
        );
    }

    /// Adds a chunk whose payload cannot be decoded.
    pub fn insert_corrupt(&self, pos: ChunkPos, mtime: Mtime) {
        self.chunks
            .write()
            .insert(pos, Entry { mtime, data: None });
    }

    /// Updates the modification time of an existing chunk.
    ///
    /// Returns false if the chunk does not exist.
    pub fn touch(&self, pos: ChunkPos, mtime: Mtime) -> bool {
        match self.chunks.write().get_mut(&pos) {
            Some(entry) => {
                entry.mtime = mtime;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, pos: ChunkPos) -> bool {
        self.chunks.write().remove(&pos).is_some()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

impl ChunkSource for MemorySource {
    fn iterate_all(&self) -> StampIter<'_> {
        let stamps: Vec<ChunkStamp> = self
            .chunks
            .read()
            .iter()
            .map(|(pos, entry)| ChunkStamp {
                pos: *pos,
                mtime: entry.mtime,
            })
            .collect();
        Box::new(stamps.into_iter())
    }

    fn get_mtime(&self, pos: ChunkPos) -> Option<Mtime> {
        self.chunks.read().get(&pos).map(|e| e.mtime)
    }

    fn load(&self, pos: ChunkPos) -> Result<Arc<ChunkData>, SourceError> {
        match self.chunks.read().get(&pos) {
            Some(Entry {
                data: Some(data), ..
            }) => Ok(Arc::clone(data)),
            Some(Entry { data: None, .. }) => Err(SourceError::Corrupt {
                pos,
                reason: "payload does not decode".to_string(),
            }),
            None => Err(SourceError::NotFound(pos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_lists_in_order() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(2, 0), 10, vec![1]);
        source.insert(ChunkPos::new(-1, 5), 20, vec![2]);

        let stamps: Vec<_> = source.iterate_all().collect();
        assert_eq!(
            stamps,
            vec![ChunkStamp::new(-1, 5, 20), ChunkStamp::new(2, 0, 10)]
        );
    }

    #[test]
    fn test_memory_source_newer_than() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(0, 0), 10, vec![]);
        source.insert(ChunkPos::new(1, 0), 20, vec![]);

        let newer: Vec<_> = source.iterate_newer_than(10).collect();
        assert_eq!(newer, vec![ChunkStamp::new(1, 0, 20)]);
    }

    #[test]
    fn test_memory_source_absent_chunk() {
        let source = MemorySource::new();
        assert_eq!(source.get_mtime(ChunkPos::new(9, 9)), None);
        assert!(matches!(
            source.load(ChunkPos::new(9, 9)),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_memory_source_touch() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(0, 0), 10, vec![7]);
        assert!(source.touch(ChunkPos::new(0, 0), 99));
        assert!(!source.touch(ChunkPos::new(1, 1), 99));
        assert_eq!(source.get_mtime(ChunkPos::new(0, 0)), Some(99));
    }

    #[test]
    fn test_memory_source_corrupt_chunk() {
        let source = MemorySource::new();
        source.insert_corrupt(ChunkPos::new(3, 3), 5);
        assert_eq!(source.get_mtime(ChunkPos::new(3, 3)), Some(5));
        assert!(matches!(
            source.load(ChunkPos::new(3, 3)),
            Err(SourceError::Corrupt { .. })
        ));
    }
}
