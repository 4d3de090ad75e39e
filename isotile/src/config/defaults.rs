//! Default values for every configuration setting.

use super::file::config_directory;
use super::settings::*;
use crate::render::TileFormat;
use crate::scan::RequestedMode;
use crate::tilestore::DEFAULT_BACKGROUND;
use std::path::PathBuf;

/// Default coordinator poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default decoded chunks cached per worker.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Default JPEG quality when `jpeg_quality` is not given.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Log file name inside the log directory.
pub const DEFAULT_LOG_FILE: &str = "isotile.log";

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default output directory (~/.isotile/tiles).
pub fn default_output_dir() -> PathBuf {
    config_directory().join("tiles")
}

/// Default log directory (~/.isotile/logs).
pub fn default_log_dir() -> PathBuf {
    config_directory().join("logs")
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            workers: num_cpus(),
            log_dir: default_log_dir(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl TileSetSettings {
    /// Settings for a tile-set with every optional key left at its default.
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            mode: RequestedMode::default(),
            rerender_prob: 0.0,
            image_format: TileFormat::default(),
            bgcolor: DEFAULT_BACKGROUND,
            crop: None,
            changelist: None,
            optimizer: None,
        }
    }
}
