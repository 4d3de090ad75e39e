//! Directory-backed chunk source.
//!
//! Chunk payloads live in one file each, grouped into region directories of
//! 32x32 chunks:
//!
//! ```text
//! <root>/
//! ├── r.0.0/
//! │   ├── c.0.0.chunk
//! │   └── c.31.4.chunk
//! └── r.-1.0/
//!     └── c.-3.7.chunk
//! ```
//!
//! A chunk's modification time is its file's mtime. An empty chunk file does
//! not decode.

use super::{ChunkData, ChunkSource, ChunkStamp, Mtime, SourceError, StampIter};
use crate::coord::ChunkPos;
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Chunks per region side.
pub const REGION_SIZE: i64 = 32;

/// Chunk source reading `r.<rx>.<rz>/c.<x>.<z>.chunk` files.
#[derive(Debug, Clone)]
pub struct FileChunkSource {
    root: PathBuf,
}

impl FileChunkSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a chunk.
    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.root
            .join(region_dir_name(pos))
            .join(format!("c.{}.{}.chunk", pos.x, pos.z))
    }

    /// Writes a chunk file and stamps its mtime.
    pub fn write_chunk(&self, pos: ChunkPos, payload: &[u8], mtime: Mtime) -> io::Result<()> {
        let path = self.chunk_path(pos);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, payload)?;
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0))
    }

    fn regions(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Cannot list chunk source");
                return Vec::new();
            }
        };
        let mut regions: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| parse_coords(n, "r.", ""))
                    .is_some()
            })
            .map(|e| e.path())
            .collect();
        regions.sort();
        regions
    }

    fn region_stamps(region: &Path) -> Vec<ChunkStamp> {
        let entries = match fs::read_dir(region) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    region = %region.display(),
                    error = %e,
                    "Region is unreadable, treating its chunks as absent"
                );
                return Vec::new();
            }
        };

        let mut stamps = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some((x, z)) = name.to_str().and_then(|n| parse_coords(n, "c.", ".chunk")) else {
                continue;
            };
            match entry.metadata() {
                Ok(meta) => stamps.push(ChunkStamp::new(x, z, mtime_of(&meta))),
                Err(e) => {
                    warn!(chunk = %ChunkPos::new(x, z), error = %e, "Cannot read chunk mtime, skipping");
                }
            }
        }
        stamps.sort_by_key(|s| (s.pos.z, s.pos.x));
        stamps
    }
}

impl ChunkSource for FileChunkSource {
    fn iterate_all(&self) -> StampIter<'_> {
        Box::new(
            self.regions()
                .into_iter()
                .flat_map(|region| Self::region_stamps(&region)),
        )
    }

    fn get_mtime(&self, pos: ChunkPos) -> Option<Mtime> {
        fs::metadata(self.chunk_path(pos))
            .ok()
            .map(|meta| mtime_of(&meta))
    }

    fn load(&self, pos: ChunkPos) -> Result<Arc<ChunkData>, SourceError> {
        let payload = match fs::read(self.chunk_path(pos)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(pos))
            }
            Err(source) => return Err(SourceError::Io { pos, source }),
        };
        if payload.is_empty() {
            return Err(SourceError::Corrupt {
                pos,
                reason: "empty chunk file".to_string(),
            });
        }
        Ok(Arc::new(ChunkData { pos, payload }))
    }
}

fn region_dir_name(pos: ChunkPos) -> String {
    format!(
        "r.{}.{}",
        pos.x.div_euclid(REGION_SIZE),
        pos.z.div_euclid(REGION_SIZE)
    )
}

fn mtime_of(meta: &fs::Metadata) -> Mtime {
    FileTime::from_last_modification_time(meta).unix_seconds()
}

/// Parses `<prefix><a>.<b><suffix>` into `(a, b)`.
fn parse_coords(name: &str, prefix: &str, suffix: &str) -> Option<(i64, i64)> {
    let inner = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    let (a, b) = inner.split_once('.')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}
