//! Out-of-band events raised while rendering.
//!
//! Workers report side effects such as written or deleted tiles through a
//! [`SignalSender`]. In a serial run the sender delivers straight to the
//! coordinator's [`EventBus`]. In a parallel run each worker owns a channel
//! sender and the coordinator re-emits what arrives, so subscribers see the
//! same events either way.
//!
//! ```text
//!  worker 0 ──┐
//!  worker 1 ──┼── mpsc<Signal> ──▶ coordinator ──▶ EventBus ──▶ subscribers
//!  worker N ──┘
//! ```

use crate::coord::ChunkPos;
use crate::source::Mtime;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// An event raised by a render worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A tile image was written. `tile` is relative to the tile-set directory.
    TileWritten {
        tileset: String,
        tile: String,
        mtime: Mtime,
    },

    /// A tile image was removed.
    TileDeleted { tileset: String, tile: String },

    /// A chunk could not be drawn and was left out of its tile.
    ChunkSkipped {
        tileset: String,
        chunk: ChunkPos,
        reason: String,
    },
}

impl Signal {
    pub fn tileset(&self) -> &str {
        match self {
            Signal::TileWritten { tileset, .. }
            | Signal::TileDeleted { tileset, .. }
            | Signal::ChunkSkipped { tileset, .. } => tileset,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::TileWritten { tileset, tile, .. } => write!(f, "{}: wrote {}", tileset, tile),
            Signal::TileDeleted { tileset, tile } => write!(f, "{}: deleted {}", tileset, tile),
            Signal::ChunkSkipped { tileset, chunk, .. } => {
                write!(f, "{}: skipped chunk {}", tileset, chunk)
            }
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn Fn(&Signal) + Send + Sync>;

/// In-process fan-out of signals to subscribers.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler called for every emitted signal.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    pub fn emit(&self, signal: &Signal) {
        for (_, handler) in self.handlers.read().iter() {
            handler(signal);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Where a worker sends its signals.
#[derive(Clone, Debug, Default)]
pub enum SignalSender {
    /// Deliver immediately on the local bus (serial runs).
    Bus(Arc<EventBus>),
    /// Forward to the coordinator (pool workers).
    Channel(Sender<Signal>),
    /// Drop every signal.
    #[default]
    Discard,
}

impl SignalSender {
    pub fn emit(&self, signal: Signal) {
        match self {
            SignalSender::Bus(bus) => bus.emit(&signal),
            SignalSender::Channel(tx) => {
                // The coordinator only hangs up once the run is over.
                let _ = tx.send(signal);
            }
            SignalSender::Discard => {}
        }
    }
}
