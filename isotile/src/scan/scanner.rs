//! Single-pass chunk scan filling the dirty set.

use super::ScanMode;
use crate::coord::{chunk_to_col_row, tile_in_tree, tiles_touched_by_chunk, TilePath};
use crate::dirtyset::DirtySet;
use crate::source::{ChunkSource, Mtime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::info;

/// Tiles are touched by up to this many chunks, so the per-touch rerender
/// probability is divided by it.
const TOUCHES_PER_TILE: f64 = 32.0;

/// Result of one scan.
#[derive(Debug)]
pub struct ScanResult {
    pub dirty: DirtySet,
    /// Newest chunk mtime seen; the next run's cut-off after a clean finish.
    pub max_mtime: Mtime,
    pub chunks_seen: u64,
    pub chunks_changed: u64,
}

/// Walks a chunk source once and marks dirty tiles.
pub struct Scanner<'a, R = StdRng> {
    source: &'a dyn ChunkSource,
    depth: u32,
    rerender_prob: f64,
    known_max_mtime: Option<Mtime>,
    rng: R,
}

impl<'a> Scanner<'a, StdRng> {
    pub fn new(source: &'a dyn ChunkSource, depth: u32) -> Self {
        Self::with_rng(source, depth, StdRng::from_entropy())
    }
}

impl<'a, R: Rng> Scanner<'a, R> {
    pub fn with_rng(source: &'a dyn ChunkSource, depth: u32, rng: R) -> Self {
        Self {
            source,
            depth,
            rerender_prob: 0.0,
            known_max_mtime: None,
            rng,
        }
    }

    /// Chance that any tile is redrawn regardless of its chunks.
    pub fn with_rerender_prob(mut self, prob: f64) -> Self {
        self.rerender_prob = prob.clamp(0.0, 1.0);
        self
    }

    /// Newest chunk mtime, already known from a
    /// [`SourceSurvey`](crate::source::SourceSurvey). A forced scan then
    /// marks the tree without visiting a single chunk.
    pub fn with_known_max_mtime(mut self, max_mtime: Mtime) -> Self {
        self.known_max_mtime = Some(max_mtime);
        self
    }

    /// Builds the dirty set for `mode`.
    ///
    /// `since` is the incremental cut-off. Chunk touches that fall outside
    /// the tree are ignored.
    pub fn scan(&mut self, mode: ScanMode, since: Mtime) -> ScanResult {
        let started = Instant::now();
        let mut dirty = DirtySet::new(self.depth);
        let mut max_mtime = match mode {
            ScanMode::Incremental => since,
            ScanMode::Resume | ScanMode::Force => 0,
        };
        let mut chunks_seen = 0u64;
        let mut chunks_changed = 0u64;

        if mode == ScanMode::Force {
            dirty.mark_all();
            if let Some(max_mtime) = self.known_max_mtime {
                info!(mode = %mode, dirty_tiles = dirty.count(), "Every tile marked dirty");
                return ScanResult {
                    dirty,
                    max_mtime,
                    chunks_seen: 0,
                    chunks_changed: 0,
                };
            }
        }

        // Without random rerenders an incremental scan only needs new chunks.
        let stamps = if mode == ScanMode::Incremental && self.rerender_prob == 0.0 {
            self.source.iterate_newer_than(since)
        } else {
            self.source.iterate_all()
        };

        let touch_prob = self.rerender_prob / TOUCHES_PER_TILE;
        for stamp in stamps {
            chunks_seen += 1;
            max_mtime = max_mtime.max(stamp.mtime);
            let changed = stamp.mtime > since;
            if changed {
                chunks_changed += 1;
            }
            if mode == ScanMode::Force {
                continue;
            }

            for tile in tiles_touched_by_chunk(chunk_to_col_row(stamp.pos)) {
                if !tile_in_tree(tile, self.depth) {
                    continue;
                }
                let Ok(path) = TilePath::from_col_row(tile, self.depth) else {
                    continue;
                };

                if mode == ScanMode::Resume {
                    dirty.add(&path);
                    continue;
                }
                if dirty.query(&path) {
                    continue;
                }
                if changed || (touch_prob > 0.0 && self.rng.gen::<f64>() < touch_prob) {
                    dirty.add(&path);
                }
            }
        }

        info!(
            mode = %mode,
            chunks = chunks_seen,
            changed = chunks_changed,
            dirty_tiles = dirty.count(),
            elapsed_ms = started.elapsed().as_millis(),
            "Scan complete"
        );

        ScanResult {
            dirty,
            max_mtime,
            chunks_seen,
            chunks_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{ChunkPos, ColRow};
    use crate::source::MemorySource;
    use std::collections::{HashMap, HashSet};

    fn leaves(set: &DirtySet) -> HashSet<TilePath> {
        set.iterate(None, false).collect()
    }

    fn touched(chunk: ChunkPos, depth: u32) -> HashSet<TilePath> {
        tiles_touched_by_chunk(chunk_to_col_row(chunk))
            .filter(|t| tile_in_tree(*t, depth))
            .map(|t| TilePath::from_col_row(t, depth).unwrap())
            .collect()
    }

    #[test]
    fn test_incremental_marks_only_new_chunks() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(0, 0), 100, vec![1]);
        source.insert(ChunkPos::new(20, 20), 300, vec![1]);

        let result = Scanner::new(&source, 7).scan(ScanMode::Incremental, 200);
        assert_eq!(leaves(&result.dirty), touched(ChunkPos::new(20, 20), 7));
        assert_eq!(result.max_mtime, 300);
        assert_eq!(result.chunks_changed, 1);
    }

    #[test]
    fn test_incremental_nothing_changed() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(0, 0), 100, vec![1]);
        let result = Scanner::new(&source, 6).scan(ScanMode::Incremental, 100);
        assert!(result.dirty.is_empty());
        assert_eq!(result.max_mtime, 100);
    }

    #[test]
    fn test_force_marks_everything() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(1, 1), 50, vec![1]);
        let result = Scanner::new(&source, 3).scan(ScanMode::Force, 1000);
        assert_eq!(result.dirty.count(), 64);
        assert_eq!(result.max_mtime, 50);
        assert_eq!(result.chunks_seen, 1);
    }

    #[test]
    fn test_force_with_known_mtime_skips_chunks() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(1, 1), 50, vec![1]);
        let result = Scanner::new(&source, 3)
            .with_known_max_mtime(50)
            .scan(ScanMode::Force, 1000);
        assert_eq!(result.dirty.count(), 64);
        assert_eq!(result.max_mtime, 50);
        assert_eq!(result.chunks_seen, 0);
    }

    #[test]
    fn test_resume_marks_every_reachable_tile() {
        let source = MemorySource::new();
        source.insert(ChunkPos::new(0, 0), 1, vec![1]);
        source.insert(ChunkPos::new(-3, 4), 2, vec![1]);
        let result = Scanner::new(&source, 6).scan(ScanMode::Resume, 1000);

        let mut expected = touched(ChunkPos::new(0, 0), 6);
        expected.extend(touched(ChunkPos::new(-3, 4), 6));
        assert_eq!(leaves(&result.dirty), expected);
        assert_eq!(result.max_mtime, 2);
    }

    #[test]
    fn test_touches_outside_tree_are_skipped() {
        let source = MemorySource::new();
        // Row reach pushes some of this chunk's tiles past the bottom edge.
        source.insert(ChunkPos::new(-10, 10), 5, vec![1]);
        let result = Scanner::new(&source, 4).scan(ScanMode::Incremental, 0);
        assert!(result.dirty.count() > 0);
        let edge = TilePath::from_col_row(ColRow::new(-2, 28), 4).unwrap();
        assert!(result.dirty.query(&edge));
    }

    fn unchanged_square(size: i64) -> MemorySource {
        let source = MemorySource::new();
        for x in 0..size {
            for z in 0..size {
                source.insert(ChunkPos::new(x, z), 10, vec![1]);
            }
        }
        source
    }

    #[test]
    fn test_rerender_probability_matches_touch_rate() {
        let source = unchanged_square(32);
        let depth = 7;
        let prob = 0.5;

        // Chance a tile touched k times is picked is 1 - (1 - p/32)^k
        let mut touches: HashMap<TilePath, i32> = HashMap::new();
        for x in 0..32 {
            for z in 0..32 {
                for tile in touched(ChunkPos::new(x, z), depth) {
                    *touches.entry(tile).or_default() += 1;
                }
            }
        }
        let expected: f64 = touches
            .values()
            .map(|k| 1.0 - (1.0 - prob / TOUCHES_PER_TILE).powi(*k))
            .sum();

        let rng = StdRng::seed_from_u64(42);
        let result = Scanner::with_rng(&source, depth, rng)
            .with_rerender_prob(prob)
            .scan(ScanMode::Incremental, 10);

        let marked = leaves(&result.dirty);
        assert_eq!(result.chunks_changed, 0);
        assert!(marked.iter().all(|t| touches.contains_key(t)));
        let count = marked.len() as f64;
        assert!(count > 0.0);
        assert!(
            (count - expected).abs() < expected * 0.3,
            "marked {} tiles, expected about {:.1}",
            count,
            expected
        );
    }

    #[test]
    fn test_zero_rerender_probability_marks_nothing() {
        let source = unchanged_square(16);
        let rng = StdRng::seed_from_u64(42);
        let result = Scanner::with_rng(&source, 7, rng)
            .with_rerender_prob(0.0)
            .scan(ScanMode::Incremental, 10);
        assert!(result.dirty.is_empty());
    }
}
