//! Appending written and deleted tiles to a changelist file.

use crate::signals::{EventBus, Signal, SubscriptionId};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Bus subscription that records every tile a tile-set writes or deletes,
/// one relative path per line.
pub struct Changelist {
    bus: Arc<EventBus>,
    id: SubscriptionId,
    path: PathBuf,
}

impl Changelist {
    /// Opens `path` for appending and starts listening for `tileset`.
    pub fn attach(bus: &Arc<EventBus>, tileset: &str, path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file: Mutex<File> = Mutex::new(OpenOptions::new().create(true).append(true).open(path)?);
        let tileset = tileset.to_string();
        let log_path = path.to_path_buf();

        let id = bus.subscribe(move |signal| {
            let tile = match signal {
                Signal::TileWritten { tileset: t, tile, .. }
                | Signal::TileDeleted { tileset: t, tile } if *t == tileset => tile,
                _ => return,
            };
            if let Err(e) = writeln!(file.lock(), "{}", tile) {
                warn!(path = %log_path.display(), error = %e, "Failed to append to changelist");
            }
        });

        Ok(Self {
            bus: Arc::clone(bus),
            id,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Changelist {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

impl std::fmt::Debug for Changelist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changelist").field("path", &self.path).finish()
    }
}
