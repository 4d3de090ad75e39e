//! Settings structs for the configuration file.
//!
//! `[render]` maps to [`RenderSettings`] and every `[tileset.<name>]` to a
//! [`TileSetSettings`]. These are plain data; parsing lives in `parser`.

use crate::render::{CommandOptimizer, NoOptimizer, Optimizer, TileFormat};
use crate::scan::RequestedMode;
use crate::source::CropBounds;
use crate::tileset::TileSetOptions;
use image::Rgba;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub render: RenderSettings,
    /// Tile-sets in file order.
    pub tilesets: Vec<TileSetSettings>,
}

/// Settings shared by every tile-set.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Each tile-set renders into `output_dir/<name>`
    pub output_dir: PathBuf,
    /// Worker threads; 0 renders on the calling thread
    pub workers: usize,
    /// Directory for the log file
    pub log_dir: PathBuf,
    /// How often the coordinator relays worker signals while waiting
    pub poll_interval_ms: u64,
    /// Decoded chunks cached per worker; 0 disables the cache
    pub cache_size: usize,
}

impl RenderSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One `[tileset.<name>]` section.
#[derive(Debug, Clone)]
pub struct TileSetSettings {
    pub name: String,
    /// Directory of the chunk source
    pub source: PathBuf,
    pub mode: RequestedMode,
    pub rerender_prob: f64,
    pub image_format: TileFormat,
    pub bgcolor: Rgba<u8>,
    pub crop: Option<CropBounds>,
    pub changelist: Option<PathBuf>,
    /// Command line run on every written image
    pub optimizer: Option<String>,
}

impl TileSetSettings {
    /// Builds tile-set options rendering into `output_dir`.
    pub fn to_options(&self, output_dir: &Path) -> TileSetOptions {
        let optimizer: Arc<dyn Optimizer> = match self
            .optimizer
            .as_deref()
            .and_then(CommandOptimizer::from_command_line)
        {
            Some(command) => Arc::new(command),
            None => Arc::new(NoOptimizer),
        };

        let mut options = TileSetOptions::new(&self.name, output_dir)
            .with_mode(self.mode)
            .with_rerender_prob(self.rerender_prob)
            .with_format(self.image_format)
            .with_background(self.bgcolor)
            .with_optimizer(optimizer);
        if let Some(crop) = self.crop {
            options = options.with_crop(crop);
        }
        if let Some(changelist) = &self.changelist {
            options = options.with_changelist(changelist);
        }
        options
    }
}
