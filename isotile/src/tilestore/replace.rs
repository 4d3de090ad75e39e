//! Atomic file replacement.
//!
//! Tiles are written to `<final>.tmp`, stamped with their logical mtime, and
//! renamed over the final path so readers never see a half-written image.
//! Filesystems that cannot rename over an existing file get a direct write
//! instead; a reader can then observe a partial tile while it is written.

use crate::source::Mtime;
use filetime::FileTime;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Filesystem capabilities detected by [`FsCaps::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsCaps {
    /// `rename` replaces an existing destination.
    pub rename: bool,
    /// Permissions can be copied onto a file.
    pub chmod: bool,
}

impl Default for FsCaps {
    fn default() -> Self {
        Self {
            rename: true,
            chmod: true,
        }
    }
}

impl FsCaps {
    /// No optional capability; every write goes straight to its final path.
    pub fn none() -> Self {
        Self {
            rename: false,
            chmod: false,
        }
    }

    /// Tests what the filesystem holding `dir` supports.
    ///
    /// Creates two scratch files in `dir` and removes them afterwards. If the
    /// scratch files cannot be created the most conservative strategy is
    /// chosen.
    pub fn probe(dir: &Path) -> Self {
        let files = NamedTempFile::new_in(dir).and_then(|a| Ok((a, NamedTempFile::new_in(dir)?)));
        let (src, dst) = match files {
            Ok((src, dst)) => (src.into_temp_path(), dst.into_temp_path()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Filesystem probe failed, using direct writes");
                return Self::none();
            }
        };

        let rename = fs::rename(&src, &dst).is_ok();
        let chmod = fs::metadata(&dst)
            .and_then(|meta| fs::set_permissions(&dst, meta.permissions()))
            .is_ok();

        let caps = Self { rename, chmod };
        debug!(dir = %dir.display(), rename, chmod, "Probed filesystem capabilities");
        caps
    }
}

/// Writes a file so that it appears at its destination all at once.
///
/// Write the content to [`path`](Self::path), then call
/// [`commit`](Self::commit). Dropping an uncommitted replacer removes the
/// temporary file.
#[derive(Debug)]
pub struct FileReplacer {
    dest: PathBuf,
    temp: PathBuf,
    caps: FsCaps,
    committed: bool,
}

impl FileReplacer {
    pub fn new(dest: impl Into<PathBuf>, caps: FsCaps) -> Self {
        let dest = dest.into();
        let temp = if caps.rename {
            let mut name = OsString::from(dest.as_os_str());
            name.push(".tmp");
            PathBuf::from(name)
        } else {
            dest.clone()
        };
        Self {
            dest,
            temp,
            caps,
            committed: false,
        }
    }

    /// Path the content must be written to.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Stamps the written file with `mtime` and moves it into place.
    pub fn commit(mut self, mtime: Mtime) -> io::Result<()> {
        let time = FileTime::from_unix_time(mtime, 0);
        filetime::set_file_times(&self.temp, time, time)?;

        if self.temp != self.dest {
            if self.caps.chmod {
                if let Ok(meta) = fs::metadata(&self.dest) {
                    fs::set_permissions(&self.temp, meta.permissions())?;
                }
            }
            fs::rename(&self.temp, &self.dest)?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for FileReplacer {
    fn drop(&mut self) {
        if !self.committed && self.temp != self.dest {
            let _ = fs::remove_file(&self.temp);
        }
    }
}
