use super::*;
use crate::coord::ChunkPos;
use crate::dispatch::{DefaultResources, Dispatcher, SerialDispatcher};
use crate::scan::UpgradeReason;
use crate::source::MemorySource;
use tempfile::TempDir;

fn square_source(mtime: Mtime) -> Arc<MemorySource> {
    let source = MemorySource::new();
    for x in 0..3 {
        for z in 0..3 {
            source.insert(ChunkPos::new(x, z), mtime, vec![x as u8, z as u8]);
        }
    }
    Arc::new(source)
}

/// Preprocesses and dispatches a tile-set, optionally finishing it.
fn run(options: TileSetOptions, source: Arc<MemorySource>, finish: bool) -> Arc<TileSet> {
    let bus = Arc::new(EventBus::new());
    let mut tileset = TileSet::new(options, source);
    tileset.preprocess(&bus).unwrap();
    let tileset = Arc::new(tileset);

    let tasks: Vec<Arc<dyn RenderTask>> = vec![Arc::clone(&tileset) as Arc<dyn RenderTask>];
    SerialDispatcher::new(Arc::new(DefaultResources::default()))
        .render_all(&tasks, &bus)
        .unwrap();
    if finish {
        tileset.finish().unwrap();
    }
    tileset
}

#[test]
fn test_first_run_renders_everything() {
    let temp = TempDir::new().unwrap();
    let options = TileSetOptions::new("day", temp.path());
    let tileset = run(options.clone(), square_source(100), true);

    assert_eq!(tileset.mode(), Some(ScanMode::Incremental));
    assert!(tileset.stats().written > 0);
    assert!(options.tile_dir().join("base.png").exists());

    let state = RenderState::load(&options.tile_dir()).unwrap().unwrap();
    assert_eq!(state.last_render_time, 100);
    assert_eq!(state.in_progress, None);
    assert_eq!(state.depth, tileset.required_depth());
}

#[test]
fn test_unchanged_source_renders_nothing() {
    let temp = TempDir::new().unwrap();
    let options = TileSetOptions::new("day", temp.path());
    let source = square_source(100);
    run(options.clone(), Arc::clone(&source), true);

    let second = run(options, source, true);
    assert!(second.dirty().unwrap().is_empty());
    assert_eq!(second.stats(), TileSetStats::default());
}

#[test]
fn test_initial_run_marks_in_progress() {
    let temp = TempDir::new().unwrap();
    let options = TileSetOptions::new("day", temp.path());
    let bus = Arc::new(EventBus::new());

    let mut tileset = TileSet::new(options.clone(), square_source(100));
    let decision = tileset.preprocess(&bus).unwrap();
    assert!(decision.initial);

    let state = tileset.stored_state().unwrap().unwrap();
    let marker = state.in_progress.unwrap();
    assert_eq!(marker.force_watermark, None);
}

#[test]
fn test_interrupted_run_resumes() {
    let temp = TempDir::new().unwrap();
    let options = TileSetOptions::new("day", temp.path());
    let source = square_source(100);
    run(options.clone(), Arc::clone(&source), false);

    let bus = Arc::new(EventBus::new());
    let mut tileset = TileSet::new(options, source);
    let decision = tileset.preprocess(&bus).unwrap();
    assert_eq!(decision.mode, ScanMode::Resume);
    assert_eq!(decision.reasons, vec![UpgradeReason::Interrupted]);
}

#[test]
fn test_force_records_watermark() {
    let temp = TempDir::new().unwrap();
    let options = TileSetOptions::new("day", temp.path());
    let source = square_source(100);
    run(options.clone(), Arc::clone(&source), true);

    let bus = Arc::new(EventBus::new());
    let mut tileset = TileSet::new(options.with_mode(RequestedMode::Force), source);
    tileset.preprocess(&bus).unwrap();

    let marker = tileset.stored_state().unwrap().unwrap().in_progress.unwrap();
    assert_eq!(marker.force_watermark, Some(marker.started_at));
    assert_eq!(
        tileset.phase_length(0),
        tileset.dirty().unwrap().count_all()
    );
}

#[test]
fn test_growing_map_migrates_tiles() {
    let temp = TempDir::new().unwrap();
    let options = TileSetOptions::new("day", temp.path());
    let source = square_source(100);
    let first = run(options.clone(), Arc::clone(&source), true);
    let old_depth = first.required_depth();

    source.insert(ChunkPos::new(400, -400), 200, vec![9]);
    let second = run(options.clone(), source, true);
    let new_depth = second.required_depth();
    assert!(new_depth > old_depth);

    let state = RenderState::load(&options.tile_dir()).unwrap().unwrap();
    assert_eq!(state.depth, new_depth);
    assert!(options.tile_dir().join("base.png").exists());
}

#[test]
fn test_changelist_lists_written_tiles() {
    let temp = TempDir::new().unwrap();
    let list = temp.path().join("changes.txt");
    let options = TileSetOptions::new("day", temp.path().join("out")).with_changelist(&list);
    let tileset = run(options, square_source(100), true);

    let text = fs::read_to_string(&list).unwrap();
    assert_eq!(text.lines().count() as u64, tileset.stats().written);
    assert!(text.lines().any(|l| l == "base.png"));
}

#[test]
fn test_crop_hides_chunks() {
    let temp = TempDir::new().unwrap();
    let options =
        TileSetOptions::new("day", temp.path()).with_crop(CropBounds::new(0, 0, 0, 0));
    let tileset = TileSet::new(options, square_source(100));
    assert_eq!(tileset.source().iterate_all().count(), 1);
}

#[test]
fn test_finish_requires_preprocess() {
    let temp = TempDir::new().unwrap();
    let tileset = TileSet::new(TileSetOptions::new("day", temp.path()), square_source(1));
    assert!(matches!(tileset.finish(), Err(TileSetError::NotPrepared(_))));
}

/// Counts full walks over the wrapped source.
struct CountingSource {
    inner: Arc<MemorySource>,
    walks: std::sync::atomic::AtomicUsize,
}

impl ChunkSource for CountingSource {
    fn iterate_all(&self) -> crate::source::StampIter<'_> {
        self.walks.fetch_add(1, Ordering::Relaxed);
        self.inner.iterate_all()
    }

    fn get_mtime(&self, pos: ChunkPos) -> Option<Mtime> {
        self.inner.get_mtime(pos)
    }

    fn load(&self, pos: ChunkPos) -> Result<Arc<crate::source::ChunkData>, crate::source::SourceError> {
        self.inner.load(pos)
    }
}

#[test]
fn test_force_walks_the_source_once() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(CountingSource {
        inner: square_source(100),
        walks: Default::default(),
    });
    let options = TileSetOptions::new("day", temp.path()).with_mode(RequestedMode::Force);

    let mut tileset = TileSet::new(options, Arc::clone(&source) as Arc<dyn ChunkSource>);
    tileset.preprocess(&Arc::new(EventBus::new())).unwrap();

    assert_eq!(source.walks.load(Ordering::Relaxed), 1);
    assert_eq!(tileset.mode(), Some(ScanMode::Force));
    let scan_max = tileset.prepared.as_ref().unwrap().max_mtime;
    assert_eq!(scan_max, 100);
}
