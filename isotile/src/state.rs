//! Persisted per-tile-set render state.
//!
//! Stored as JSON next to the tiles. The `in_progress` record is written
//! when a full render starts and removed only when it finishes cleanly, so
//! its presence on the next run means the last one was interrupted.

use crate::source::Mtime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// File name of the state file inside a tile-set directory.
pub const STATE_FILE: &str = ".isotile-state.json";

/// Errors reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access render state {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("render state {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Marker for a render that has started but not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgress {
    /// Wall-clock start of the interrupted run, seconds since the epoch.
    pub started_at: Mtime,
    /// Set by forced runs: tiles older than this were not yet redrawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_watermark: Option<Mtime>,
}

/// What one run leaves behind for the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderState {
    /// Tree depth the tiles on disk are laid out for.
    pub depth: u32,
    /// Newest chunk mtime seen by the last clean run.
    pub last_render_time: Mtime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<InProgress>,
}

impl RenderState {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(STATE_FILE)
    }

    /// Loads the state stored in `dir`, or `None` on a first run.
    pub fn load(dir: &Path) -> Result<Option<Self>, StateError> {
        let path = Self::path(dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StateError::Parse { path, source })
    }

    /// Atomically replaces the state stored in `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), StateError> {
        let path = Self::path(dir);
        let io_err = |source| StateError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(io_err)?;
        let json = serde_json::to_string_pretty(self).map_err(|source| StateError::Parse {
            path: path.clone(),
            source,
        })?;

        let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
        temp.write_all(json.as_bytes()).map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    pub fn is_interrupted(&self) -> bool {
        self.in_progress.is_some()
    }
}
