//! Chunk source providers
//!
//! A [`ChunkSource`] is the read-only view of the world being rendered. It
//! lists chunk columns with their modification times and loads their payload
//! on demand. Providers must answer "absent" for coordinates that hold no
//! chunk rather than failing.

mod crop;
mod file;
mod memory;

pub use crop::{CropBounds, CroppedSource};
pub use file::FileChunkSource;
pub use memory::MemorySource;

use crate::coord::{ChunkPos, DiagBounds};
use std::sync::Arc;
use thiserror::Error;

/// Modification time in whole seconds since the Unix epoch.
pub type Mtime = i64;

/// A chunk column together with its modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStamp {
    pub pos: ChunkPos,
    pub mtime: Mtime,
}

impl ChunkStamp {
    pub fn new(x: i64, z: i64, mtime: Mtime) -> Self {
        Self {
            pos: ChunkPos::new(x, z),
            mtime,
        }
    }
}

/// What a single pass over a source learns ahead of the scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSurvey {
    pub bounds: DiagBounds,
    /// Newest chunk mtime, 0 for an empty source.
    pub max_mtime: Mtime,
    pub chunks: u64,
}

impl SourceSurvey {
    /// Walks every chunk of `source` once.
    pub fn of(source: &dyn ChunkSource) -> Self {
        let mut max_mtime = 0;
        let mut chunks = 0;
        let bounds = DiagBounds::from_chunks(source.iterate_all().map(|stamp| {
            max_mtime = max_mtime.max(stamp.mtime);
            chunks += 1;
            stamp.pos
        }));
        Self {
            bounds,
            max_mtime,
            chunks,
        }
    }
}

/// Decoded chunk column handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub pos: ChunkPos,
    pub payload: Vec<u8>,
}

/// Errors raised when loading chunk payloads.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("chunk {0} not found")]
    NotFound(ChunkPos),

    #[error("chunk {pos} is corrupt: {reason}")]
    Corrupt { pos: ChunkPos, reason: String },

    #[error("failed to read chunk {pos}: {source}")]
    Io {
        pos: ChunkPos,
        #[source]
        source: std::io::Error,
    },
}

/// Iterator over chunk stamps borrowed from a source.
pub type StampIter<'a> = Box<dyn Iterator<Item = ChunkStamp> + 'a>;

/// Read-only provider of chunk columns.
///
/// Implementations are shared by every render worker.
pub trait ChunkSource: Send + Sync {
    /// Lists every chunk column.
    fn iterate_all(&self) -> StampIter<'_>;

    /// Lists chunk columns modified after `time`.
    fn iterate_newer_than(&self, time: Mtime) -> StampIter<'_> {
        Box::new(self.iterate_all().filter(move |s| s.mtime > time))
    }

    /// Returns the modification time of a chunk, or `None` if absent.
    fn get_mtime(&self, pos: ChunkPos) -> Option<Mtime>;

    /// Loads a chunk payload.
    fn load(&self, pos: ChunkPos) -> Result<Arc<ChunkData>, SourceError>;
}

impl<S: ChunkSource + ?Sized> ChunkSource for Arc<S> {
    fn iterate_all(&self) -> StampIter<'_> {
        (**self).iterate_all()
    }

    fn iterate_newer_than(&self, time: Mtime) -> StampIter<'_> {
        (**self).iterate_newer_than(time)
    }

    fn get_mtime(&self, pos: ChunkPos) -> Option<Mtime> {
        (**self).get_mtime(pos)
    }

    fn load(&self, pos: ChunkPos) -> Result<Arc<ChunkData>, SourceError> {
        (**self).load(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_survey_collects_bounds_and_newest_mtime() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(0, 0), 30, vec![1]);
        source.insert(ChunkPos::new(3, -2), 80, vec![1]);
        source.insert(ChunkPos::new(-1, 4), 50, vec![1]);

        let survey = SourceSurvey::of(&source);
        assert_eq!(survey.chunks, 3);
        assert_eq!(survey.max_mtime, 80);
        assert_eq!(
            survey.bounds,
            DiagBounds::from_chunks(source.iterate_all().map(|s| s.pos))
        );
    }

    #[test]
    fn test_survey_of_empty_source() {
        let survey = SourceSurvey::of(&MemorySource::new());
        assert_eq!(survey, SourceSurvey::default());
    }
}
