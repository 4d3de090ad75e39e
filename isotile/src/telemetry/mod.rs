//! Progress telemetry for render runs.
//!
//! Dispatchers emit progress events via a sink abstraction and never decide
//! how progress is shown. This follows the "emit, don't present" pattern:
//! the CLI logs progress, tests count events, and other front ends can draw
//! progress bars from the same stream.
//!
//! # Example
//!
//! ```
//! use isotile::telemetry::{TelemetryEvent, TelemetrySink};
//!
//! struct LoggingSink;
//!
//! impl TelemetrySink for LoggingSink {
//!     fn emit(&self, event: TelemetryEvent) {
//!         tracing::info!(?event, "Render event");
//!     }
//! }
//! ```

use crate::coord::TilePath;
use std::time::Duration;

// =============================================================================
// Telemetry Events
// =============================================================================

/// Events emitted while dispatching render work.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    /// A phase is about to start. `estimate` is an upper bound on its items.
    PhaseStarted {
        phase: usize,
        phases: usize,
        estimate: u64,
    },

    /// One work item finished.
    ItemCompleted {
        phase: usize,
        task: String,
        path: TilePath,
        completed: u64,
        estimate: u64,
    },

    /// A phase finished.
    PhaseCompleted {
        phase: usize,
        completed: u64,
        duration: Duration,
    },
}

impl TelemetryEvent {
    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseStarted { .. } => "phase_started",
            Self::ItemCompleted { .. } => "item_completed",
            Self::PhaseCompleted { .. } => "phase_completed",
        }
    }
}

// =============================================================================
// Telemetry Sink Trait
// =============================================================================

/// Sink for telemetry events.
///
/// Events are emitted on the coordinator thread only; `emit` should return
/// quickly.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

// =============================================================================
// Built-in Sink Implementations
// =============================================================================

/// No-op sink for when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {
        // Intentionally empty
    }
}

/// Sink that logs progress using the `tracing` crate.
///
/// Item completions are logged every `report_every` items and at the end of
/// each phase.
#[derive(Debug, Clone, Copy)]
pub struct TracingTelemetrySink {
    report_every: u64,
}

impl Default for TracingTelemetrySink {
    fn default() -> Self {
        Self { report_every: 100 }
    }
}

impl TracingTelemetrySink {
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
        }
    }
}

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::PhaseStarted {
                phase,
                phases,
                estimate,
            } => {
                tracing::info!(
                    phase = phase + 1,
                    phases = phases,
                    estimate = estimate,
                    "Starting render phase"
                );
            }
            TelemetryEvent::ItemCompleted {
                task,
                path,
                completed,
                estimate,
                ..
            } => {
                if completed % self.report_every == 0 {
                    let percent = if *estimate == 0 {
                        100.0
                    } else {
                        (*completed as f64 / *estimate as f64 * 100.0).min(100.0)
                    };
                    tracing::info!(
                        completed = completed,
                        estimate = estimate,
                        percent = format_args!("{:.1}", percent),
                        "Rendered {} tiles",
                        completed
                    );
                } else {
                    tracing::trace!(task = %task, path = %path, "Tile done");
                }
            }
            TelemetryEvent::PhaseCompleted {
                phase,
                completed,
                duration,
            } => {
                tracing::info!(
                    phase = phase + 1,
                    completed = completed,
                    duration_ms = duration.as_millis(),
                    "Render phase complete"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(completed: u64) -> TelemetryEvent {
        TelemetryEvent::ItemCompleted {
            phase: 0,
            task: "day".to_string(),
            path: TilePath::root(),
            completed,
            estimate: 10,
        }
    }

    #[test]
    fn test_null_sink() {
        NullTelemetrySink.emit(item(1));
    }

    #[test]
    fn test_tracing_sink() {
        // Should not panic whether or not logging is configured
        let sink = TracingTelemetrySink::new(0);
        sink.emit(item(1));
        sink.emit(TelemetryEvent::PhaseCompleted {
            phase: 0,
            completed: 1,
            duration: Duration::ZERO,
        });
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(item(1).event_type(), "item_completed");
        assert_eq!(
            TelemetryEvent::PhaseStarted {
                phase: 0,
                phases: 1,
                estimate: 0
            }
            .event_type(),
            "phase_started"
        );
    }
}
