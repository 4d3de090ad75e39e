//! In-thread dispatcher.

use super::{
    phase_count, phase_estimate, phase_items, DispatchError, DispatchStats, Dispatcher,
    RenderTask, WorkerContext, WorkerResources,
};
use crate::signals::{EventBus, SignalSender};
use crate::telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Runs every item on the calling thread, in stream order.
///
/// Post-order streams already put children before parents, so no
/// dependency tracking is needed.
pub struct SerialDispatcher {
    resources: Arc<dyn WorkerResources>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl SerialDispatcher {
    pub fn new(resources: Arc<dyn WorkerResources>) -> Self {
        Self {
            resources,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

impl Dispatcher for SerialDispatcher {
    fn render_all(
        &mut self,
        tasks: &[Arc<dyn RenderTask>],
        bus: &Arc<EventBus>,
    ) -> Result<DispatchStats, DispatchError> {
        let mut renderer = self.resources.renderer();
        let cache = self.resources.cache();
        let signals = SignalSender::Bus(Arc::clone(bus));
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

            let mut completed = 0u64;
            for (index, item) in phase_items(tasks, phase, &signals) {
                let task = &tasks[index];
                let mut ctx = WorkerContext {
                    renderer: renderer.as_mut(),
                    cache: cache.as_ref(),
                    signals: &signals,
                };
                if let Err(e) = task.do_work(&item.path, &mut ctx) {
                    error!(tileset = %task.name(), path = %item.path, error = %e, "Render failed");
                    return Err(DispatchError::WorkerFailed {
                        tileset: task.name().to_string(),
                        path: item.path,
                        message: e.to_string(),
                    });
                }

                completed += 1;
                self.telemetry.emit(TelemetryEvent::ItemCompleted {
                    phase,
                    task: task.name().to_string(),
                    path: item.path,
                    completed,
                    estimate,
                });
            }

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
