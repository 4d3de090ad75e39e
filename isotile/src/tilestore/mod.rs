//! On-disk tile pyramid
//!
//! Tiles live under the tile-set directory at a path derived from their
//! quadtree address:
//!
//! ```text
//! <root>/
//! ├── base.png          root composite
//! ├── 0.png  1.png  2.png  3.png
//! ├── 0/
//! │   ├── 0.png ... 3.png
//! │   └── 0/ ... 3/
//! └── ...
//! ```
//!
//! Every write stamps the file with the newest source mtime that went into
//! it. Later runs compare those stamps against chunk mtimes, so the write
//! time itself is never recorded.

mod migrate;
mod render;
mod replace;

pub use migrate::{decrease_depth, increase_depth, MigrateResult};
pub use render::LeafContext;
pub use replace::{FileReplacer, FsCaps};

use crate::coord::TilePath;
use crate::render::{NoOptimizer, Optimizer, RenderError, TileFormat};
use crate::signals::{Signal, SignalSender};
use crate::source::Mtime;
use filetime::FileTime;
use image::Rgba;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that abort work on a tile.
#[derive(Debug, Error)]
pub enum TileStoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl TileStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TileStoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// What happened to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Written and stamped with `mtime`.
    Written { mtime: Mtime },
    /// Nothing to draw, so the stale image was removed.
    Deleted,
    /// Nothing to draw and no image existed.
    Absent,
    /// Encoding or moving the image failed. The old image, if any, is kept.
    Failed,
}

/// Default background: dark grey, fully transparent.
pub const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([0x1a, 0x1a, 0x1a, 0]);

/// Reads and writes the tiles of one tile-set.
#[derive(Clone)]
pub struct TileStore {
    name: String,
    root: PathBuf,
    depth: u32,
    format: TileFormat,
    caps: FsCaps,
    background: Rgba<u8>,
    optimizer: Arc<dyn Optimizer>,
}

impl TileStore {
    /// Creates a store for a tree of `depth` under `root`.
    ///
    /// `name` identifies the tile-set in signals and log lines.
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        depth: u32,
        format: TileFormat,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            depth,
            format,
            caps: FsCaps::default(),
            background: DEFAULT_BACKGROUND,
            optimizer: Arc::new(NoOptimizer),
        }
    }

    pub fn with_caps(mut self, caps: FsCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = background;
        self
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    pub fn caps(&self) -> FsCaps {
        self.caps
    }

    /// Image path of a tile, relative to the tile-set directory.
    pub fn relative_path(&self, path: &TilePath) -> PathBuf {
        let ext = self.format.extension();
        match path.digits().split_last() {
            None => PathBuf::from(format!("base.{}", ext)),
            Some((last, parents)) => {
                let mut rel = PathBuf::new();
                for d in parents {
                    rel.push(d.to_string());
                }
                rel.push(format!("{}.{}", last, ext));
                rel
            }
        }
    }

    /// Image path of a tile.
    pub fn tile_path(&self, path: &TilePath) -> PathBuf {
        self.root.join(self.relative_path(path))
    }

    /// Directory holding the descendants of a tile.
    pub fn subtree_dir(&self, path: &TilePath) -> PathBuf {
        let mut dir = self.root.clone();
        for d in path.digits() {
            dir.push(d.to_string());
        }
        dir
    }

    /// Logical mtime of a tile image, or `None` if it does not exist.
    pub fn tile_mtime(&self, path: &TilePath) -> Option<Mtime> {
        fs::metadata(self.tile_path(path))
            .ok()
            .map(|meta| FileTime::from_last_modification_time(&meta).unix_seconds())
    }

    /// Wall-clock time the tile file was last replaced.
    ///
    /// The mtime holds the logical source time, so it cannot tell whether a
    /// forced run already redrew the tile. The status-change time can: both
    /// the rename into place and the mtime stamp move it to the present.
    pub fn tile_written_at(&self, path: &TilePath) -> Option<Mtime> {
        fs::metadata(self.tile_path(path))
            .ok()
            .and_then(|meta| status_changed_at(&meta))
    }

    /// Returns true if the tile image or any of its descendants' directory
    /// exists.
    pub fn exists_on_disk(&self, path: &TilePath) -> bool {
        self.tile_path(path).exists() || (!path.is_root() && self.subtree_dir(path).is_dir())
    }

    /// Removes a tile image. Returns whether a file was removed.
    pub fn delete_tile(
        &self,
        path: &TilePath,
        signals: &SignalSender,
    ) -> Result<bool, TileStoreError> {
        let file = self.tile_path(path);
        match fs::remove_file(&file) {
            Ok(()) => {
                signals.emit(Signal::TileDeleted {
                    tileset: self.name.clone(),
                    tile: self.relative_path(path).to_string_lossy().into_owned(),
                });
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TileStoreError::io(file, e)),
        }
    }

    /// Removes a tile image and everything below it.
    ///
    /// Used for tiles that no chunk can reach any more.
    pub fn nuke_path(&self, path: &TilePath, signals: &SignalSender) -> Result<(), TileStoreError> {
        debug!(tileset = %self.name, path = %path, "Removing orphaned tile subtree");
        self.delete_tile(path, signals)?;
        if path.is_root() {
            return Ok(());
        }
        let dir = self.subtree_dir(path);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TileStoreError::io(dir, e)),
        }
    }
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("depth", &self.depth)
            .field("format", &self.format)
            .field("caps", &self.caps)
            .field("optimizer", &self.optimizer.name())
            .finish()
    }
}

#[cfg(unix)]
fn status_changed_at(meta: &fs::Metadata) -> Option<Mtime> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ctime())
}

// No status-change time here. Creation time is the closest stand-in since
// every replaced tile is a freshly created temp file.
#[cfg(not(unix))]
fn status_changed_at(meta: &fs::Metadata) -> Option<Mtime> {
    meta.created()
        .ok()
        .map(|t| FileTime::from_system_time(t).unix_seconds())
}
