//! Configuration for isotile.
//!
//! Settings come from an INI file, by default `~/.isotile/config.ini`:
//!
//! ```ini
//! [render]
//! output_dir = ~/maps
//! workers = 4
//!
//! [tileset.day]
//! source = ~/worlds/home
//! image_format = jpeg
//! jpeg_quality = 90
//! changelist = ~/maps/day-changes.txt
//! ```
//!
//! Each key overlays a built-in default, so an empty `[render]` section and a
//! single `source` line are enough for a working tile-set.
//!
//! # Example
//!
//! ```
//! use isotile::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert!(config.tilesets.is_empty());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use parser::{parse_bgcolor, TILESET_SECTION_PREFIX};
pub use settings::{ConfigFile, RenderSettings, TileSetSettings};
