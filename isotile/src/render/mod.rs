//! Chunk rendering collaborators
//!
//! The tile store owns the canvas and the draw order. A [`Renderer`] only
//! knows how to paint one chunk column at a pixel offset, and a
//! [`TileFormat`] turns a finished canvas into a file.
//!
//! Renderers are built inside the worker that uses them and never cross
//! threads, so they need not be `Send`.

mod codec;
mod flat;

pub use codec::{CodecError, CommandOptimizer, NoOptimizer, Optimizer, TileFormat};
pub use flat::FlatRenderer;

use crate::cache::{load_through, ChunkCache};
use crate::coord::ChunkPos;
use crate::source::{ChunkData, ChunkSource, Mtime, SourceError};
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

/// Side length of every output tile in pixels.
pub const TILE_SIZE: u32 = 384;

/// Errors raised while drawing a chunk.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The chunk could not be decoded. It is skipped and the tile still renders.
    #[error("chunk {pos} skipped: {reason}")]
    Corrupt { pos: ChunkPos, reason: String },

    /// The renderer cannot continue. Aborts the whole run.
    #[error("fatal render error: {0}")]
    Fatal(String),
}

impl From<SourceError> for RenderError {
    fn from(err: SourceError) -> Self {
        let pos = match &err {
            SourceError::NotFound(pos) => *pos,
            SourceError::Corrupt { pos, .. } => *pos,
            SourceError::Io { pos, .. } => *pos,
        };
        RenderError::Corrupt {
            pos,
            reason: err.to_string(),
        }
    }
}

/// Read access to the world for a renderer, through the worker's cache.
pub struct World<'a> {
    source: &'a dyn ChunkSource,
    cache: &'a dyn ChunkCache,
}

impl<'a> World<'a> {
    pub fn new(source: &'a dyn ChunkSource, cache: &'a dyn ChunkCache) -> Self {
        Self { source, cache }
    }

    pub fn load(&self, pos: ChunkPos) -> Result<Arc<ChunkData>, SourceError> {
        load_through(self.cache, self.source, pos)
    }

    pub fn mtime(&self, pos: ChunkPos) -> Option<Mtime> {
        self.source.get_mtime(pos)
    }
}

/// Paints chunk columns onto a tile canvas.
pub trait Renderer {
    /// Draws one chunk with its upper-left corner at pixel `(x, y)`.
    ///
    /// The offset may lie partly or wholly off the canvas; drawing is clipped.
    fn draw_chunk(
        &mut self,
        world: &World<'_>,
        pos: ChunkPos,
        canvas: &mut RgbaImage,
        x: i64,
        y: i64,
    ) -> Result<(), RenderError>;
}
