//! Work item scheduling
//!
//! Turns a dirty set into a stream of [`WorkItem`]s, each naming the tiles
//! it depends on. Incremental and forced runs stream the dirty set's
//! post-order directly. Resumed runs go through [`TileChecker`], which
//! compares the tiles on disk against their sources and skips the ones that
//! are already current.

mod check;

pub use check::{CheckStats, TileChecker};

use crate::coord::TilePath;
use crate::dirtyset::{DirtyIter, DirtySet};
use crate::scan::ScanMode;
use crate::signals::SignalSender;
use crate::source::{ChunkSource, Mtime};
use crate::tilestore::TileStore;

/// A tile to render and the tiles that must be finished first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: TilePath,
    /// The four children for a composite, nothing for a render-tile. A
    /// dependency need not be scheduled itself.
    pub deps: Vec<TilePath>,
}

impl WorkItem {
    pub fn new(path: TilePath, depth: u32) -> Self {
        let deps = if path.len() < depth as usize {
            path.children().to_vec()
        } else {
            Vec::new()
        };
        Self { path, deps }
    }
}

/// Stream of work items for one phase.
pub enum WorkItems<'a> {
    Direct { tiles: DirtyIter<'a>, depth: u32 },
    Check(TileChecker<'a>),
}

impl Iterator for WorkItems<'_> {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        match self {
            WorkItems::Direct { tiles, depth } => tiles.next().map(|p| WorkItem::new(p, *depth)),
            WorkItems::Check(checker) => checker.next(),
        }
    }
}

/// Inputs the scheduler needs from a tile-set.
pub struct ScheduleInput<'a> {
    pub mode: ScanMode,
    pub dirty: &'a DirtySet,
    pub store: &'a TileStore,
    pub source: &'a dyn ChunkSource,
    pub force_watermark: Option<Mtime>,
    pub signals: SignalSender,
    pub round_robin: bool,
}

/// Builds the work item stream for a scan mode.
pub fn work_items(input: ScheduleInput<'_>) -> WorkItems<'_> {
    match input.mode {
        ScanMode::Incremental | ScanMode::Force => WorkItems::Direct {
            tiles: input.dirty.post_traversal(input.round_robin),
            depth: input.dirty.depth(),
        },
        ScanMode::Resume => WorkItems::Check(TileChecker::new(
            input.dirty,
            input.store,
            input.source,
            input.force_watermark,
            input.signals,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::TileFormat;
    use crate::source::MemorySource;
    use std::path::Path;

    #[test]
    fn test_work_item_deps() {
        let leaf = WorkItem::new(TilePath::from_digits(vec![0, 1]).unwrap(), 2);
        assert!(leaf.deps.is_empty());

        let composite = WorkItem::new(TilePath::from_digits(vec![3]).unwrap(), 2);
        assert_eq!(composite.deps.len(), 4);
        assert_eq!(composite.deps[2].digits(), &[3, 2]);
    }

    #[test]
    fn test_direct_stream_is_post_order() {
        let mut dirty = DirtySet::new(2);
        dirty.add(&TilePath::from_digits(vec![2, 2]).unwrap());
        let store = TileStore::new("t", Path::new("/unused"), 2, TileFormat::Png);
        let source = MemorySource::new();

        let items: Vec<_> = work_items(ScheduleInput {
            mode: ScanMode::Incremental,
            dirty: &dirty,
            store: &store,
            source: &source,
            force_watermark: None,
            signals: SignalSender::Discard,
            round_robin: false,
        })
        .map(|w| w.path.to_string())
        .collect();
        assert_eq!(items, vec!["2/2", "2", "base"]);
    }
}
