//! One rendered map: a chunk source, its output directory, and the state
//! carried between runs.
//!
//! A tile-set goes through three steps per run:
//!
//! 1. [`TileSet::preprocess`] on the coordinator: load the stored state,
//!    migrate the tile tree if the map outgrew or shrank its depth, choose
//!    the scan mode, mark the run in progress and build the dirty set.
//! 2. Dispatch: as a [`RenderTask`] it hands out work items and renders
//!    tiles on whatever worker picks them up.
//! 3. [`TileSet::finish`] after a clean dispatch: store the new render time
//!    and clear the in-progress marker.

mod changelist;

pub use changelist::Changelist;

use crate::coord::{required_depth, TilePath};
use crate::dirtyset::DirtySet;
use crate::dispatch::{RenderTask, TaskError, WorkerContext};
use crate::render::{NoOptimizer, Optimizer, TileFormat, World};
use crate::scan::{select_mode, DepthChange, ModeDecision, RequestedMode, ScanMode, Scanner};
use crate::scheduler::{work_items, ScheduleInput, WorkItem};
use crate::signals::{EventBus, SignalSender};
use crate::source::{ChunkSource, CropBounds, CroppedSource, Mtime, SourceSurvey};
use crate::state::{InProgress, RenderState, StateError};
use crate::tilestore::{
    decrease_depth, increase_depth, FsCaps, LeafContext, TileOutcome, TileStore, TileStoreError,
    DEFAULT_BACKGROUND,
};
use image::Rgba;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while preparing or finishing a tile-set.
#[derive(Debug, Error)]
pub enum TileSetError {
    #[error("tile-set {tileset}: {source}")]
    State {
        tileset: String,
        #[source]
        source: StateError,
    },

    #[error("tile-set {tileset}: {source}")]
    Store {
        tileset: String,
        #[source]
        source: TileStoreError,
    },

    #[error("tile-set {tileset}: I/O error at {path}: {source}")]
    Io {
        tileset: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tile-set {0} has not been preprocessed")]
    NotPrepared(String),
}

/// Settings for one tile-set.
#[derive(Clone)]
pub struct TileSetOptions {
    pub name: String,
    /// Tiles go to `output_dir/name`.
    pub output_dir: PathBuf,
    pub mode: RequestedMode,
    /// Chance per run that an unchanged render-tile is redrawn anyway.
    pub rerender_prob: f64,
    pub format: TileFormat,
    pub background: Rgba<u8>,
    pub crop: Option<CropBounds>,
    pub changelist: Option<PathBuf>,
    pub optimizer: Arc<dyn Optimizer>,
}

impl TileSetOptions {
    pub fn new(name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
            mode: RequestedMode::default(),
            rerender_prob: 0.0,
            format: TileFormat::default(),
            background: DEFAULT_BACKGROUND,
            crop: None,
            changelist: None,
            optimizer: Arc::new(NoOptimizer),
        }
    }

    pub fn with_mode(mut self, mode: RequestedMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rerender_prob(mut self, prob: f64) -> Self {
        self.rerender_prob = prob;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = background;
        self
    }

    pub fn with_crop(mut self, crop: CropBounds) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_changelist(mut self, path: impl Into<PathBuf>) -> Self {
        self.changelist = Some(path.into());
        self
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Directory holding this tile-set's tiles and state.
    pub fn tile_dir(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }
}

impl std::fmt::Debug for TileSetOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSetOptions")
            .field("name", &self.name)
            .field("output_dir", &self.output_dir)
            .field("mode", &self.mode)
            .field("rerender_prob", &self.rerender_prob)
            .field("format", &self.format)
            .field("crop", &self.crop)
            .field("changelist", &self.changelist)
            .field("optimizer", &self.optimizer.name())
            .finish()
    }
}

/// Tile counts from the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileSetStats {
    pub written: u64,
    pub deleted: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    deleted: AtomicU64,
    failed: AtomicU64,
}

struct Prepared {
    decision: ModeDecision,
    store: TileStore,
    dirty: DirtySet,
    max_mtime: Mtime,
    _changelist: Option<Changelist>,
}

/// A tile-set and its per-run state.
pub struct TileSet {
    options: TileSetOptions,
    source: Arc<dyn ChunkSource>,
    prepared: Option<Prepared>,
    counters: Counters,
}

impl TileSet {
    /// Creates a tile-set over `source`, cropped if the options say so.
    pub fn new(options: TileSetOptions, source: Arc<dyn ChunkSource>) -> Self {
        let source = match options.crop {
            Some(bounds) => Arc::new(CroppedSource::new(source, bounds)) as Arc<dyn ChunkSource>,
            None => source,
        };
        Self {
            options,
            source,
            prepared: None,
            counters: Counters::default(),
        }
    }

    pub fn options(&self) -> &TileSetOptions {
        &self.options
    }

    pub fn source(&self) -> &Arc<dyn ChunkSource> {
        &self.source
    }

    /// Depth needed to hold every chunk currently in the source.
    pub fn required_depth(&self) -> u32 {
        required_depth(&SourceSurvey::of(self.source.as_ref()).bounds)
    }

    /// State left by the previous run, if any.
    pub fn stored_state(&self) -> Result<Option<RenderState>, TileSetError> {
        RenderState::load(&self.options.tile_dir()).map_err(|source| self.state_error(source))
    }

    /// Mode chosen by [`preprocess`](Self::preprocess).
    pub fn mode(&self) -> Option<ScanMode> {
        self.prepared.as_ref().map(|p| p.decision.mode)
    }

    /// Dirty set built by [`preprocess`](Self::preprocess).
    pub fn dirty(&self) -> Option<&DirtySet> {
        self.prepared.as_ref().map(|p| &p.dirty)
    }

    pub fn store(&self) -> Option<&TileStore> {
        self.prepared.as_ref().map(|p| &p.store)
    }

    pub fn stats(&self) -> TileSetStats {
        TileSetStats {
            written: self.counters.written.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Gets the tile-set ready to dispatch.
    ///
    /// Signals raised here, such as tiles removed by a depth change, go to
    /// `bus`. The changelist, if configured, listens on `bus` until the
    /// tile-set is dropped.
    pub fn preprocess(&mut self, bus: &Arc<EventBus>) -> Result<ModeDecision, TileSetError> {
        let name = self.options.name.clone();
        let dir = self.options.tile_dir();
        fs::create_dir_all(&dir).map_err(|source| TileSetError::Io {
            tileset: name.clone(),
            path: dir.clone(),
            source,
        })?;

        let started_at = unix_now();
        let prior = self.stored_state()?;
        let survey = SourceSurvey::of(self.source.as_ref());
        let depth = required_depth(&survey.bounds);
        let ext = self.options.format.extension();

        let change = prior
            .as_ref()
            .map_or(DepthChange::Unchanged, |p| DepthChange::between(p.depth, depth));
        let migrated = match change {
            DepthChange::Unchanged => None,
            DepthChange::Increased { from, to } => Some(increase_depth(&dir, ext, from, to)),
            DepthChange::Decreased { from, to } => Some(decrease_depth(&dir, ext, from, to)),
        }
        .transpose()
        .map_err(|source| self.store_error(source))?;

        let decision = select_mode(self.options.mode, prior.as_ref(), change);
        for reason in &decision.reasons {
            warn!(tileset = %name, reason = %reason, "Checking every tile against its sources");
        }
        info!(tileset = %name, mode = %decision.mode, depth, "Preparing tile-set");

        // Marks the run so an interruption is noticed next time.
        let marker = match decision.mode {
            ScanMode::Force => Some(InProgress {
                started_at,
                force_watermark: Some(started_at),
            }),
            ScanMode::Resume => Some(prior.and_then(|p| p.in_progress).unwrap_or(InProgress {
                started_at,
                force_watermark: None,
            })),
            ScanMode::Incremental if decision.initial => Some(InProgress {
                started_at,
                force_watermark: None,
            }),
            ScanMode::Incremental => None,
        };
        RenderState {
            depth,
            last_render_time: decision.since,
            in_progress: marker,
        }
        .save(&dir)
        .map_err(|source| self.state_error(source))?;

        let store = TileStore::new(name.clone(), &dir, depth, self.options.format)
            .with_caps(FsCaps::probe(&dir))
            .with_background(self.options.background)
            .with_optimizer(Arc::clone(&self.options.optimizer));

        let signals = SignalSender::Bus(Arc::clone(bus));
        if let Some(result) = &migrated {
            for path in &result.stale_composites {
                store
                    .render_composite(path, &signals)
                    .map_err(|source| self.store_error(source))?;
            }
        }

        let scan = Scanner::new(self.source.as_ref(), depth)
            .with_rerender_prob(self.options.rerender_prob)
            .with_known_max_mtime(survey.max_mtime)
            .scan(decision.mode, decision.since);

        let changelist = match &self.options.changelist {
            Some(path) => Some(Changelist::attach(bus, &name, path).map_err(|source| {
                TileSetError::Io {
                    tileset: name.clone(),
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };

        self.prepared = Some(Prepared {
            decision: decision.clone(),
            store,
            dirty: scan.dirty,
            max_mtime: scan.max_mtime,
            _changelist: changelist,
        });
        Ok(decision)
    }

    /// Records a clean completion. Call only after every phase finished.
    pub fn finish(&self) -> Result<(), TileSetError> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| TileSetError::NotPrepared(self.options.name.clone()))?;

        let stats = self.stats();
        info!(
            tileset = %self.options.name,
            written = stats.written,
            deleted = stats.deleted,
            failed = stats.failed,
            "Tile-set complete"
        );

        RenderState {
            depth: prepared.store.depth(),
            last_render_time: prepared.max_mtime,
            in_progress: None,
        }
        .save(&self.options.tile_dir())
        .map_err(|source| self.state_error(source))
    }

    fn state_error(&self, source: StateError) -> TileSetError {
        TileSetError::State {
            tileset: self.options.name.clone(),
            source,
        }
    }

    fn store_error(&self, source: TileStoreError) -> TileSetError {
        TileSetError::Store {
            tileset: self.options.name.clone(),
            source,
        }
    }
}

impl RenderTask for TileSet {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn num_phases(&self) -> usize {
        1
    }

    fn phase_length(&self, _phase: usize) -> u64 {
        self.prepared.as_ref().map_or(0, |p| p.dirty.count_all())
    }

    fn iterate_work_items(
        &self,
        _phase: usize,
        signals: SignalSender,
    ) -> Box<dyn Iterator<Item = WorkItem> + '_> {
        let Some(prepared) = &self.prepared else {
            return Box::new(std::iter::empty());
        };
        Box::new(work_items(ScheduleInput {
            mode: prepared.decision.mode,
            dirty: &prepared.dirty,
            store: &prepared.store,
            source: self.source.as_ref(),
            force_watermark: prepared.decision.force_watermark,
            signals,
            round_robin: true,
        }))
    }

    fn do_work(&self, path: &TilePath, ctx: &mut WorkerContext<'_>) -> Result<(), TaskError> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| TileSetError::NotPrepared(self.options.name.clone()))?;

        let mut leaf = LeafContext {
            renderer: &mut *ctx.renderer,
            world: World::new(self.source.as_ref(), ctx.cache),
            signals: ctx.signals,
        };
        let counter = match prepared.store.render_tile(path, &mut leaf)? {
            TileOutcome::Written { .. } => &self.counters.written,
            TileOutcome::Deleted => &self.counters.deleted,
            TileOutcome::Failed => &self.counters.failed,
            TileOutcome::Absent => return Ok(()),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for TileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSet")
            .field("name", &self.options.name)
            .field("mode", &self.mode())
            .finish()
    }
}

fn unix_now() -> Mtime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as Mtime)
}

#[cfg(test)]
mod tests;
