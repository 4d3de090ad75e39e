//! Worker pool dispatcher.
//!
//! Each worker is a long-lived thread with its own job channel. Results and
//! signals come back on two shared channels. The tasks are published to
//! workers as a version-tagged snapshot: a job names the version it was
//! scheduled against, and a worker that holds an older one asks for the
//! current snapshot before running it. Snapshots are only rebuilt when the
//! task list changes, so repeated runs over the same tasks ship nothing.

use super::{
    phase_count, phase_estimate, phase_items, DispatchError, DispatchStats, Dispatcher,
    RenderTask, WorkerContext, WorkerResources,
};
use crate::coord::TilePath;
use crate::scheduler::WorkItem;
use crate::signals::{EventBus, Signal, SignalSender};
use crate::telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink};
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long the coordinator waits for a result before relaying signals.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Items in flight per worker, pending and running combined.
const WINDOW_PER_WORKER: usize = 4;

struct Snapshot {
    version: u64,
    tasks: Vec<Arc<dyn RenderTask>>,
}

struct Job {
    version: u64,
    task: usize,
    path: TilePath,
}

enum ToWorker {
    Job(Job),
    Snapshot(Arc<Snapshot>),
    Shutdown,
}

enum FromWorker {
    Done {
        worker: usize,
        task: usize,
        path: TilePath,
    },
    Failed {
        worker: usize,
        task: usize,
        path: TilePath,
        message: String,
    },
    NeedSnapshot {
        worker: usize,
    },
}

struct WorkerHandle {
    jobs: Sender<ToWorker>,
    thread: Option<JoinHandle<()>>,
}

/// Dispatches work items over a pool of worker threads.
///
/// An item is only handed to a worker once none of its dependencies are
/// pending or running. Siblings run in any order.
pub struct ParallelDispatcher {
    workers: Vec<WorkerHandle>,
    results: Receiver<FromWorker>,
    signals: Receiver<Signal>,
    snapshot: Option<Arc<Snapshot>>,
    window: usize,
    poll_interval: Duration,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ParallelDispatcher {
    /// Starts `workers` threads, each building its renderer and cache from
    /// `resources`.
    pub fn new(workers: usize, resources: Arc<dyn WorkerResources>) -> Result<Self, DispatchError> {
        let count = workers.max(1);
        let (result_tx, results) = mpsc::channel();
        let (signal_tx, signals) = mpsc::channel();

        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let (job_tx, job_rx) = mpsc::channel();
            let resources = Arc::clone(&resources);
            let result_tx = result_tx.clone();
            let signal_tx = signal_tx.clone();

            let thread = thread::Builder::new()
                .name(format!("render-worker-{}", id))
                .spawn(move || worker_loop(id, resources.as_ref(), job_rx, result_tx, signal_tx))
                .map_err(DispatchError::Spawn)?;

            handles.push(WorkerHandle {
                jobs: job_tx,
                thread: Some(thread),
            });
        }

        info!(workers = count, "Started render workers");

        Ok(Self {
            workers: handles,
            results,
            signals,
            snapshot: None,
            window: count * WINDOW_PER_WORKER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            telemetry: Arc::new(NullTelemetrySink),
        })
    }

    /// Caps the number of items pulled ahead of completion.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Version of the task snapshot last published to workers.
    pub fn snapshot_version(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.version)
    }

    /// Stops and joins every worker. The dispatcher cannot be used again.
    pub fn shutdown(&mut self) {
        for worker in &self.workers {
            let _ = worker.jobs.send(ToWorker::Shutdown);
        }
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!(worker = id, "Render worker panicked");
                }
            }
        }
        self.workers.clear();
    }

    /// Returns the snapshot for `tasks`, replacing the current one only if
    /// the task list changed.
    fn publish(&mut self, tasks: &[Arc<dyn RenderTask>]) -> Arc<Snapshot> {
        if let Some(current) = &self.snapshot {
            let unchanged = current.tasks.len() == tasks.len()
                && current
                    .tasks
                    .iter()
                    .zip(tasks)
                    .all(|(a, b)| Arc::ptr_eq(a, b));
            if unchanged {
                return Arc::clone(current);
            }
        }

        let version = self.snapshot_version().map_or(1, |v| v + 1);
        debug!(version, tasks = tasks.len(), "Publishing task snapshot");
        let snapshot = Arc::new(Snapshot {
            version,
            tasks: tasks.to_vec(),
        });
        self.snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn relay_signals(&self, bus: &EventBus) {
        while let Ok(signal) = self.signals.try_recv() {
            bus.emit(&signal);
        }
    }

    fn run_phase(
        &self,
        snapshot: &Arc<Snapshot>,
        phase: usize,
        estimate: u64,
        bus: &Arc<EventBus>,
    ) -> Result<u64, DispatchError> {
        let coordinator_signals = SignalSender::Bus(Arc::clone(bus));
        let mut items = phase_items(&snapshot.tasks, phase, &coordinator_signals);
        let mut exhausted = false;

        let mut pending: VecDeque<(usize, WorkItem)> = VecDeque::new();
        let mut waiting: HashSet<(usize, TilePath)> = HashSet::new();
        let mut running: HashSet<(usize, TilePath)> = HashSet::new();
        let mut idle: Vec<usize> = (0..self.workers.len()).rev().collect();
        let mut completed = 0u64;
        let mut failure: Option<DispatchError> = None;

        loop {
            if failure.is_none() {
                while !exhausted && pending.len() + running.len() < self.window {
                    match items.next() {
                        Some((task, item)) => {
                            waiting.insert((task, item.path.clone()));
                            pending.push_back((task, item));
                        }
                        None => exhausted = true,
                    }
                }

                let mut i = 0;
                while i < pending.len() && !idle.is_empty() {
                    let (task, item) = &pending[i];
                    let blocked = item.deps.iter().any(|dep| {
                        let key = (*task, dep.clone());
                        waiting.contains(&key) || running.contains(&key)
                    });
                    if blocked {
                        i += 1;
                        continue;
                    }

                    let Some((task, item)) = pending.remove(i) else {
                        break;
                    };
                    let Some(worker) = idle.pop() else {
                        break;
                    };
                    let key = (task, item.path);
                    waiting.remove(&key);

                    let job = Job {
                        version: snapshot.version,
                        task,
                        path: key.1.clone(),
                    };
                    if self.workers[worker].jobs.send(ToWorker::Job(job)).is_err() {
                        failure = Some(DispatchError::PoolClosed);
                        break;
                    }
                    running.insert(key);
                }
            }

            let drained = exhausted && pending.is_empty();
            if running.is_empty() && (drained || failure.is_some()) {
                break;
            }

            let first = match self.results.recv_timeout(self.poll_interval) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    failure.get_or_insert(DispatchError::PoolClosed);
                    break;
                }
            };

            let messages = first
                .into_iter()
                .chain(std::iter::from_fn(|| self.results.try_recv().ok()));
            for message in messages {
                match message {
                    FromWorker::Done { worker, task, path } => {
                        idle.push(worker);
                        running.remove(&(task, path.clone()));
                        completed += 1;
                        self.telemetry.emit(TelemetryEvent::ItemCompleted {
                            phase,
                            task: snapshot.tasks[task].name().to_string(),
                            path,
                            completed,
                            estimate,
                        });
                    }
                    FromWorker::Failed {
                        worker,
                        task,
                        path,
                        message,
                    } => {
                        idle.push(worker);
                        running.remove(&(task, path.clone()));
                        let tileset = snapshot.tasks[task].name().to_string();
                        error!(tileset = %tileset, path = %path, error = %message, "Render failed");
                        failure.get_or_insert(DispatchError::WorkerFailed {
                            tileset,
                            path,
                            message,
                        });
                    }
                    FromWorker::NeedSnapshot { worker } => {
                        let refresh = ToWorker::Snapshot(Arc::clone(snapshot));
                        if self.workers[worker].jobs.send(refresh).is_err() {
                            failure.get_or_insert(DispatchError::PoolClosed);
                        }
                    }
                }
            }

            self.relay_signals(bus);
        }

        self.relay_signals(bus);
        match failure {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }
}

impl Dispatcher for ParallelDispatcher {
    fn render_all(
        &mut self,
        tasks: &[Arc<dyn RenderTask>],
        bus: &Arc<EventBus>,
    ) -> Result<DispatchStats, DispatchError> {
        if self.workers.is_empty() {
            return Err(DispatchError::PoolClosed);
        }

        let snapshot = self.publish(tasks);
        let phases = phase_count(tasks);
        let mut stats = DispatchStats {
            phases,
            completed: 0,
        };

        for phase in 0..phases {
            let estimate = phase_estimate(tasks, phase);
            let started = Instant::now();
            self.telemetry.emit(TelemetryEvent::PhaseStarted {
                phase,
                phases,
                estimate,
            });

            let completed = match self.run_phase(&snapshot, phase, estimate, bus) {
                Ok(completed) => completed,
                Err(e) => {
                    self.shutdown();
                    return Err(e);
                }
            };

            stats.completed += completed;
            self.telemetry.emit(TelemetryEvent::PhaseCompleted {
                phase,
                completed,
                duration: started.elapsed(),
            });
        }

        Ok(stats)
    }
}

impl Drop for ParallelDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Worker
// =============================================================================

fn worker_loop(
    id: usize,
    resources: &dyn WorkerResources,
    jobs: Receiver<ToWorker>,
    results: Sender<FromWorker>,
    signals: Sender<Signal>,
) {
    let mut renderer = resources.renderer();
    let cache = resources.cache();
    let signals = SignalSender::Channel(signals);
    let mut snapshot: Option<Arc<Snapshot>> = None;

    while let Ok(message) = jobs.recv() {
        let job = match message {
            ToWorker::Job(job) => job,
            ToWorker::Snapshot(latest) => {
                snapshot = Some(latest);
                continue;
            }
            ToWorker::Shutdown => break,
        };

        if snapshot.as_ref().map(|s| s.version) != Some(job.version) {
            debug!(worker = id, version = job.version, "Requesting task snapshot");
            if results.send(FromWorker::NeedSnapshot { worker: id }).is_err() {
                break;
            }
            match jobs.recv() {
                Ok(ToWorker::Snapshot(latest)) => snapshot = Some(latest),
                _ => break,
            }
        }

        let task = snapshot.as_ref().and_then(|s| s.tasks.get(job.task));
        let reply = match task {
            Some(task) => {
                let mut ctx = WorkerContext {
                    renderer: renderer.as_mut(),
                    cache: cache.as_ref(),
                    signals: &signals,
                };
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| task.do_work(&job.path, &mut ctx)));
                match outcome {
                    Ok(Ok(())) => FromWorker::Done {
                        worker: id,
                        task: job.task,
                        path: job.path,
                    },
                    Ok(Err(e)) => FromWorker::Failed {
                        worker: id,
                        task: job.task,
                        path: job.path,
                        message: e.to_string(),
                    },
                    Err(_) => FromWorker::Failed {
                        worker: id,
                        task: job.task,
                        path: job.path,
                        message: "render worker panicked".to_string(),
                    },
                }
            }
            None => FromWorker::Failed {
                worker: id,
                task: job.task,
                path: job.path,
                message: format!("no task {} in snapshot", job.task),
            },
        };

        if results.send(reply).is_err() {
            break;
        }
    }

    debug!(worker = id, "Render worker exiting");
}
