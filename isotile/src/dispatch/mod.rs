//! Running render work across one or more workers.
//!
//! A [`RenderTask`] describes its work as phases of [`WorkItem`]s. A
//! dispatcher pulls those items and calls [`RenderTask::do_work`] on them,
//! never starting an item while one of its dependencies is still waiting or
//! in progress.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Coordinator                           │
//! │   iterate_work_items ─► pending ─► running ─► done         │
//! └────────────────────────────────────────────────────────────┘
//!          │ jobs (one channel per worker)   ▲ results, signals
//!          ▼                                 │
//! ┌────────────────────────────────────────────────────────────┐
//! │   Worker threads (own renderer + chunk cache each)          │
//! │   do_work(path, &mut WorkerContext)                         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`SerialDispatcher`] does the same work inline on the calling thread.

mod parallel;
mod serial;

pub use parallel::{ParallelDispatcher, DEFAULT_POLL_INTERVAL};
pub use serial::SerialDispatcher;

use crate::cache::{ChunkCache, LruCache, NoOpCache};
use crate::coord::TilePath;
use crate::render::{FlatRenderer, Renderer};
use crate::scheduler::WorkItem;
use crate::signals::{EventBus, SignalSender};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by [`RenderTask::do_work`]. Any error is fatal to the run.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rendering {path} in tile-set {tileset} failed: {message}")]
    WorkerFailed {
        tileset: String,
        path: TilePath,
        message: String,
    },

    #[error("failed to spawn render worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("render worker pool has shut down")]
    PoolClosed,
}

/// Resources a worker owns for the lifetime of its thread.
pub struct WorkerContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub cache: &'a dyn ChunkCache,
    pub signals: &'a SignalSender,
}

/// A unit of schedulable render work, such as one tile-set.
///
/// Tasks are shared read-only with every worker, so all per-worker state
/// lives in the [`WorkerContext`].
pub trait RenderTask: Send + Sync {
    fn name(&self) -> &str;

    fn num_phases(&self) -> usize;

    /// Upper bound on the items of `phase`, for progress reporting.
    fn phase_length(&self, phase: usize) -> u64;

    /// Items for `phase`, each after all of its dependencies that appear at
    /// all. Runs on the coordinator. Side effects of the walk report through
    /// `signals`.
    fn iterate_work_items(
        &self,
        phase: usize,
        signals: SignalSender,
    ) -> Box<dyn Iterator<Item = WorkItem> + '_>;

    /// Renders one tile. Runs on a worker.
    fn do_work(&self, path: &TilePath, ctx: &mut WorkerContext<'_>) -> Result<(), TaskError>;
}

/// Builds the per-worker renderer and cache inside each worker.
pub trait WorkerResources: Send + Sync {
    fn renderer(&self) -> Box<dyn Renderer>;

    fn cache(&self) -> Box<dyn ChunkCache>;
}

/// [`FlatRenderer`] with an LRU chunk cache of `cache_size` entries.
///
/// A cache size of 0 disables caching.
#[derive(Debug, Clone, Copy)]
pub struct DefaultResources {
    pub cache_size: usize,
}

impl Default for DefaultResources {
    fn default() -> Self {
        Self { cache_size: 256 }
    }
}

impl WorkerResources for DefaultResources {
    fn renderer(&self) -> Box<dyn Renderer> {
        Box::new(FlatRenderer::new())
    }

    fn cache(&self) -> Box<dyn ChunkCache> {
        if self.cache_size == 0 {
            Box::new(NoOpCache::new())
        } else {
            Box::new(LruCache::new(self.cache_size))
        }
    }
}

/// Totals from a completed dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub phases: usize,
    pub completed: u64,
}

/// Runs every phase of a set of tasks.
///
/// Phase `n` of every task finishes before phase `n + 1` of any task
/// starts. Signals end up on `bus` in either implementation.
pub trait Dispatcher {
    fn render_all(
        &mut self,
        tasks: &[Arc<dyn RenderTask>],
        bus: &Arc<EventBus>,
    ) -> Result<DispatchStats, DispatchError>;
}

fn phase_count(tasks: &[Arc<dyn RenderTask>]) -> usize {
    tasks.iter().map(|t| t.num_phases()).max().unwrap_or(0)
}

fn phase_estimate(tasks: &[Arc<dyn RenderTask>], phase: usize) -> u64 {
    tasks
        .iter()
        .filter(|t| phase < t.num_phases())
        .map(|t| t.phase_length(phase))
        .fold(0u64, u64::saturating_add)
}

/// Every item of `phase` across all tasks, tagged with the task index.
fn phase_items<'a>(
    tasks: &'a [Arc<dyn RenderTask>],
    phase: usize,
    signals: &SignalSender,
) -> impl Iterator<Item = (usize, WorkItem)> + 'a {
    let signals = signals.clone();
    tasks
        .iter()
        .enumerate()
        .filter(move |(_, t)| phase < t.num_phases())
        .flat_map(move |(index, task)| {
            task.iterate_work_items(phase, signals.clone())
                .map(move |item| (index, item))
        })
}

#[cfg(test)]
mod tests;
