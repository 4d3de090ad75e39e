//! isotile - incremental isometric tile pyramids for voxel worlds
//!
//! A world is split into chunks, each with its own modification time. The
//! library keeps a quadtree of image tiles in sync with those chunks:
//! leaf tiles are drawn from chunks, every other tile is its four children
//! scaled down, and each run only redraws what changed since the last one.
//!
//! # High-Level Flow
//!
//! ```ignore
//! use isotile::dispatch::{DefaultResources, Dispatcher, SerialDispatcher};
//! use isotile::signals::EventBus;
//! use isotile::tileset::{TileSet, TileSetOptions};
//!
//! let bus = Arc::new(EventBus::new());
//! let mut tileset = TileSet::new(TileSetOptions::new("day", "/srv/maps"), source);
//! tileset.preprocess(&bus)?;
//! let tileset = Arc::new(tileset);
//!
//! SerialDispatcher::new(Arc::new(DefaultResources::default()))
//!     .render_all(&[tileset.clone()], &bus)?;
//! tileset.finish()?;
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod dirtyset;
pub mod dispatch;
pub mod logging;
pub mod render;
pub mod scan;
pub mod scheduler;
pub mod signals;
pub mod source;
pub mod state;
pub mod telemetry;
pub mod tilestore;
pub mod tileset;

/// Version of the isotile library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
