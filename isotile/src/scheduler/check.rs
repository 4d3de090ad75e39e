//! Verifying tiles on disk before a resumed render.
//!
//! ```text
//!   base            needs render if a child does, or if it is older than
//!    ├── 0          its newest child
//!    │   ├── 0/0    needs render if missing or older than its newest chunk
//!    │   └── ...
//!    └── ...
//! ```
//!
//! Tiles carry logical mtimes, so a tile is matched against an interrupted
//! forced run by the time its file was last replaced instead. Anything
//! written before that run started is redrawn, at every level.
//!
//! The walk is depth-first with children before parents, so the work items
//! come out in an order the dispatcher can honor. Tiles on disk that the
//! dirty set does not cover are orphans and are removed along the way.

use super::WorkItem;
use crate::coord::{chunks_in_tile, col_row_to_chunk, TilePath};
use crate::dirtyset::DirtySet;
use crate::signals::SignalSender;
use crate::source::{ChunkSource, Mtime};
use crate::tilestore::TileStore;
use tracing::{debug, warn};

/// Counters from a verification walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub checked: u64,
    pub stale: u64,
    pub orphans_removed: u64,
}

struct Frame {
    path: TilePath,
    next_child: u8,
    newest_child: Option<Mtime>,
    child_stale: bool,
}

impl Frame {
    fn new(path: TilePath) -> Self {
        Self {
            path,
            next_child: 0,
            newest_child: None,
            child_stale: false,
        }
    }
}

/// Lazily yields the tiles of a dirty set that actually need rendering.
pub struct TileChecker<'a> {
    dirty: &'a DirtySet,
    store: &'a TileStore,
    source: &'a dyn ChunkSource,
    watermark: Option<Mtime>,
    signals: SignalSender,
    stack: Vec<Frame>,
    stats: CheckStats,
}

impl<'a> TileChecker<'a> {
    pub fn new(
        dirty: &'a DirtySet,
        store: &'a TileStore,
        source: &'a dyn ChunkSource,
        watermark: Option<Mtime>,
        signals: SignalSender,
    ) -> Self {
        Self {
            dirty,
            store,
            source,
            watermark,
            signals,
            stack: vec![Frame::new(TilePath::root())],
            stats: CheckStats::default(),
        }
    }

    pub fn stats(&self) -> CheckStats {
        self.stats
    }

    /// True if the tile was last written before an interrupted forced run
    /// started, so that run never got to it.
    fn predates_watermark(&self, path: &TilePath) -> bool {
        match self.watermark {
            Some(w) => self.store.tile_written_at(path).map_or(true, |t| t < w),
            None => false,
        }
    }

    /// Newest mtime of the chunks drawn on a render-tile, if any.
    fn newest_chunk(&self, path: &TilePath) -> Option<Mtime> {
        chunks_in_tile(path.to_col_row())
            .into_iter()
            .filter_map(|coord| col_row_to_chunk(coord).ok())
            .filter_map(|pos| self.source.get_mtime(pos))
            .max()
    }

    fn check_leaf(&self, path: &TilePath) -> (Option<Mtime>, bool) {
        let newest = self.newest_chunk(path);
        let stale = match (self.store.tile_mtime(path), newest) {
            (None, None) => false,
            // Nothing to draw any more, the tile has to go
            (Some(_), None) => true,
            (None, Some(_)) => true,
            (Some(tile), Some(chunk)) => tile < chunk || self.predates_watermark(path),
        };
        (newest, stale)
    }

    fn check_composite(&self, frame: &Frame) -> (Option<Mtime>, bool) {
        let stale = frame.child_stale
            || match (self.store.tile_mtime(&frame.path), frame.newest_child) {
                (None, None) => false,
                (Some(_), None) | (None, Some(_)) => true,
                (Some(tile), Some(child)) => {
                    tile < child || self.predates_watermark(&frame.path)
                }
            };
        (frame.newest_child, stale)
    }

    fn remove_orphan(&mut self, path: &TilePath) {
        if !self.store.exists_on_disk(path) {
            return;
        }
        debug!(tileset = %self.store.name(), path = %path, "Removing orphaned tiles");
        match self.store.nuke_path(path, &self.signals) {
            Ok(()) => self.stats.orphans_removed += 1,
            Err(e) => warn!(
                tileset = %self.store.name(),
                path = %path,
                error = %e,
                "Failed to remove orphaned tiles"
            ),
        }
    }

    /// Pops the finished top frame, reports it to its parent, and returns a
    /// work item if it needs rendering.
    fn finish_top(&mut self, leaf: bool) -> Option<WorkItem> {
        let frame = self.stack.pop()?;
        let (mtime, stale) = if leaf {
            self.check_leaf(&frame.path)
        } else {
            self.check_composite(&frame)
        };
        self.stats.checked += 1;

        if let Some(parent) = self.stack.last_mut() {
            parent.child_stale |= stale;
            if let Some(m) = mtime {
                parent.newest_child = Some(parent.newest_child.map_or(m, |p| p.max(m)));
            }
        }

        if stale {
            self.stats.stale += 1;
            Some(WorkItem::new(frame.path, self.dirty.depth()))
        } else {
            None
        }
    }
}

impl Iterator for TileChecker<'_> {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        let depth = self.dirty.depth() as usize;
        loop {
            let top = self.stack.last_mut()?;

            if top.path.len() == depth {
                if let Some(item) = self.finish_top(true) {
                    return Some(item);
                }
                continue;
            }

            if top.next_child < 4 {
                let child = top.path.child(top.next_child);
                top.next_child += 1;
                if self.dirty.query(&child) {
                    self.stack.push(Frame::new(child));
                } else {
                    self.remove_orphan(&child);
                }
                continue;
            }

            if let Some(item) = self.finish_top(false) {
                return Some(item);
            }
        }
    }
}
