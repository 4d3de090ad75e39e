use super::*;
use crate::dirtyset::DirtySet;
use crate::signals::Signal;
use crate::telemetry::TelemetryEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Start(TilePath),
    End(TilePath),
}

struct RecordingTask {
    name: String,
    dirty: DirtySet,
    log: Mutex<Vec<Step>>,
    fail_on: Option<TilePath>,
    delay: Duration,
}

impl RecordingTask {
    fn new(name: &str, depth: u32, leaves: &[&[u8]]) -> Self {
        let mut dirty = DirtySet::new(depth);
        for digits in leaves {
            dirty.add(&TilePath::from_digits(digits.to_vec()).unwrap());
        }
        Self {
            name: name.to_string(),
            dirty,
            log: Mutex::new(Vec::new()),
            fail_on: None,
            delay: Duration::ZERO,
        }
    }

    fn failing_on(mut self, digits: &[u8]) -> Self {
        self.fail_on = Some(TilePath::from_digits(digits.to_vec()).unwrap());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn steps(&self) -> Vec<Step> {
        self.log.lock().clone()
    }
}

impl RenderTask for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_phases(&self) -> usize {
        1
    }

    fn phase_length(&self, _phase: usize) -> u64 {
        self.dirty.count_all()
    }

    fn iterate_work_items(
        &self,
        _phase: usize,
        _signals: SignalSender,
    ) -> Box<dyn Iterator<Item = WorkItem> + '_> {
        let depth = self.dirty.depth();
        Box::new(
            self.dirty
                .post_traversal(true)
                .map(move |path| WorkItem::new(path, depth)),
        )
    }

    fn do_work(&self, path: &TilePath, ctx: &mut WorkerContext<'_>) -> Result<(), TaskError> {
        self.log.lock().push(Step::Start(path.clone()));
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_on.as_ref() == Some(path) {
            return Err("renderer exploded".into());
        }
        ctx.signals.emit(Signal::TileWritten {
            tileset: self.name.clone(),
            tile: path.to_string(),
            mtime: 1,
        });
        self.log.lock().push(Step::End(path.clone()));
        Ok(())
    }
}

fn count_written(bus: &Arc<EventBus>) -> Arc<AtomicUsize> {
    let written = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&written);
    bus.subscribe(move |signal| {
        if matches!(signal, Signal::TileWritten { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    written
}

/// Asserts no tile started before all of its started children had ended.
fn assert_children_first(steps: &[Step]) {
    let mut ended: HashMap<TilePath, usize> = HashMap::new();
    let mut started: HashMap<TilePath, usize> = HashMap::new();
    for (i, step) in steps.iter().enumerate() {
        match step {
            Step::Start(p) => {
                started.insert(p.clone(), i);
            }
            Step::End(p) => {
                ended.insert(p.clone(), i);
            }
        }
    }
    for (path, start) in &started {
        for child in path.children() {
            if started.contains_key(&child) {
                let end = ended[&child];
                assert!(end < *start, "{} started before child {} ended", path, child);
            }
        }
    }
}

fn tasks(list: Vec<Arc<RecordingTask>>) -> Vec<Arc<dyn RenderTask>> {
    list.into_iter().map(|t| t as Arc<dyn RenderTask>).collect()
}

#[derive(Default)]
struct CountingSink {
    events: Mutex<Vec<&'static str>>,
}

impl crate::telemetry::TelemetrySink for CountingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event.event_type());
    }
}

#[test]
fn test_serial_runs_in_stream_order() {
    let task = Arc::new(RecordingTask::new("a", 2, &[&[0, 0], &[3, 1]]));
    let bus = Arc::new(EventBus::new());
    let written = count_written(&bus);

    let mut dispatcher = SerialDispatcher::new(Arc::new(DefaultResources::default()));
    let stats = dispatcher
        .render_all(&tasks(vec![Arc::clone(&task)]), &bus)
        .unwrap();

    let expected: Vec<_> = task.dirty.post_traversal(true).collect();
    let started: Vec<_> = task
        .steps()
        .into_iter()
        .filter_map(|s| match s {
            Step::Start(p) => Some(p),
            Step::End(_) => None,
        })
        .collect();
    assert_eq!(started, expected);
    assert_eq!(stats.completed, 5);
    assert_eq!(written.load(Ordering::SeqCst), 5);
}

#[test]
fn test_serial_failure_aborts() {
    let task = Arc::new(RecordingTask::new("a", 2, &[&[0, 0], &[3, 1]]).failing_on(&[0, 0]));
    let bus = Arc::new(EventBus::new());

    let mut dispatcher = SerialDispatcher::new(Arc::new(DefaultResources::default()));
    let err = dispatcher
        .render_all(&tasks(vec![Arc::clone(&task)]), &bus)
        .unwrap_err();

    match err {
        DispatchError::WorkerFailed { tileset, path, .. } => {
            assert_eq!(tileset, "a");
            assert_eq!(path.digits(), &[0, 0]);
        }
        other => panic!("unexpected error: {}", other),
    }
    let steps = task.steps();
    assert_eq!(steps.last(), Some(&Step::Start(TilePath::from_digits(vec![0, 0]).unwrap())));
    assert!(!steps.contains(&Step::Start(TilePath::root())));
}

#[test]
fn test_serial_reports_telemetry() {
    let task = Arc::new(RecordingTask::new("a", 1, &[&[2]]));
    let sink = Arc::new(CountingSink::default());
    let mut dispatcher = SerialDispatcher::new(Arc::new(DefaultResources::default()))
        .with_telemetry(Arc::clone(&sink) as Arc<dyn crate::telemetry::TelemetrySink>);
    dispatcher
        .render_all(&tasks(vec![task]), &Arc::new(EventBus::new()))
        .unwrap();

    assert_eq!(
        *sink.events.lock(),
        vec!["phase_started", "item_completed", "item_completed", "phase_completed"]
    );
}

#[test]
fn test_parallel_children_before_parents() {
    let leaves: Vec<Vec<u8>> = (0..4u8)
        .flat_map(|a| (0..4u8).map(move |b| vec![a, b, (a + b) % 4]))
        .collect();
    let leaf_refs: Vec<&[u8]> = leaves.iter().map(|v| v.as_slice()).collect();
    let task = Arc::new(
        RecordingTask::new("a", 3, &leaf_refs).with_delay(Duration::from_millis(2)),
    );
    let bus = Arc::new(EventBus::new());
    let written = count_written(&bus);

    let mut dispatcher = ParallelDispatcher::new(4, Arc::new(DefaultResources::default()))
        .unwrap()
        .with_poll_interval(Duration::from_millis(5));
    let stats = dispatcher
        .render_all(&tasks(vec![Arc::clone(&task)]), &bus)
        .unwrap();

    let expected = task.dirty.count_all();
    assert_eq!(stats.completed, expected);
    assert_eq!(written.load(Ordering::SeqCst) as u64, expected);
    assert_children_first(&task.steps());
}

#[test]
fn test_parallel_runs_several_tasks() {
    let a = Arc::new(RecordingTask::new("a", 2, &[&[0, 0], &[1, 1]]));
    let b = Arc::new(RecordingTask::new("b", 2, &[&[2, 2]]));
    let bus = Arc::new(EventBus::new());

    let mut dispatcher = ParallelDispatcher::new(2, Arc::new(DefaultResources::default())).unwrap();
    let stats = dispatcher
        .render_all(&tasks(vec![Arc::clone(&a), Arc::clone(&b)]), &bus)
        .unwrap();

    assert_eq!(stats.completed, a.dirty.count_all() + b.dirty.count_all());
    assert_children_first(&a.steps());
    assert_children_first(&b.steps());
}

#[test]
fn test_parallel_snapshot_only_bumps_on_change() {
    let a: Arc<dyn RenderTask> = Arc::new(RecordingTask::new("a", 1, &[&[0]]));
    let b: Arc<dyn RenderTask> = Arc::new(RecordingTask::new("b", 1, &[&[1]]));
    let bus = Arc::new(EventBus::new());
    let mut dispatcher = ParallelDispatcher::new(2, Arc::new(DefaultResources::default())).unwrap();

    dispatcher.render_all(&[Arc::clone(&a)], &bus).unwrap();
    assert_eq!(dispatcher.snapshot_version(), Some(1));
    dispatcher.render_all(&[Arc::clone(&a)], &bus).unwrap();
    assert_eq!(dispatcher.snapshot_version(), Some(1));
    dispatcher.render_all(&[a, b], &bus).unwrap();
    assert_eq!(dispatcher.snapshot_version(), Some(2));
}

#[test]
fn test_parallel_failure_shuts_down_pool() {
    let task = Arc::new(RecordingTask::new("a", 2, &[&[0, 0], &[3, 3]]).failing_on(&[3, 3]));
    let bus = Arc::new(EventBus::new());
    let list = tasks(vec![Arc::clone(&task)]);

    let mut dispatcher = ParallelDispatcher::new(2, Arc::new(DefaultResources::default())).unwrap();
    let err = dispatcher.render_all(&list, &bus).unwrap_err();
    assert!(matches!(err, DispatchError::WorkerFailed { .. }));
    assert_eq!(dispatcher.worker_count(), 0);

    // Parents of the failed tile never start
    let started_root = task
        .steps()
        .iter()
        .any(|s| *s == Step::Start(TilePath::root()));
    assert!(!started_root);

    let err = dispatcher.render_all(&list, &bus).unwrap_err();
    assert!(matches!(err, DispatchError::PoolClosed));
}

#[test]
fn test_empty_task_list() {
    let bus = Arc::new(EventBus::new());
    let mut dispatcher = ParallelDispatcher::new(1, Arc::new(DefaultResources::default())).unwrap();
    let stats = dispatcher.render_all(&[], &bus).unwrap();
    assert_eq!(stats, DispatchStats::default());
}
