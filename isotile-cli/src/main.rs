//! isotile CLI - Command-line interface
//!
//! Renders every tile-set in a config file, or reports the tree depth each
//! one needs.

mod error;

use clap::{Args, Parser, Subcommand};
use error::CliError;
use isotile::config::{config_file_path, ConfigFile, TileSetSettings, DEFAULT_LOG_FILE};
use isotile::dispatch::{
    DefaultResources, Dispatcher, ParallelDispatcher, RenderTask, SerialDispatcher,
};
use isotile::logging::init_logging;
use isotile::scan::RequestedMode;
use isotile::signals::EventBus;
use isotile::source::{ChunkSource, FileChunkSource};
use isotile::telemetry::TracingTelemetrySink;
use isotile::tileset::TileSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "isotile")]
#[command(version = isotile::VERSION)]
#[command(about = "Incremental isometric map renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every configured tile-set
    Render(RenderArgs),
    /// Print the tree depth each tile-set needs and the one on disk
    Depth {
        /// Config file (default: ~/.isotile/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RenderArgs {
    /// Config file (default: ~/.isotile/config.ini)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Redraw every tile
    #[arg(long, conflicts_with = "check_tiles")]
    force: bool,

    /// Compare every tile against its chunks instead of trusting the last
    /// render time
    #[arg(long)]
    check_tiles: bool,

    /// Worker threads (0 renders on the main thread)
    #[arg(long)]
    workers: Option<usize>,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Render(args) => render(args),
        Command::Depth { config } => depth(config),
    };
    if let Err(e) = result {
        e.exit();
    }
}

fn load_config(path: Option<PathBuf>) -> Result<(PathBuf, ConfigFile), CliError> {
    let path = path.unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;
    if config.tilesets.is_empty() {
        return Err(CliError::NoTileSets(path));
    }
    Ok((path, config))
}

fn build_tileset(settings: &TileSetSettings, output_dir: &Path) -> TileSet {
    let source: Arc<dyn ChunkSource> = Arc::new(FileChunkSource::new(&settings.source));
    TileSet::new(settings.to_options(output_dir), source)
}

fn render(args: RenderArgs) -> Result<(), CliError> {
    let (path, mut config) = load_config(args.config)?;

    let override_mode = if args.force {
        Some(RequestedMode::Force)
    } else if args.check_tiles {
        Some(RequestedMode::CheckTiles)
    } else {
        None
    };
    if let Some(mode) = override_mode {
        for tileset in &mut config.tilesets {
            tileset.mode = mode;
        }
    }
    let workers = args.workers.unwrap_or(config.render.workers);

    let _guard = init_logging(&config.render.log_dir, DEFAULT_LOG_FILE).map_err(|error| {
        CliError::LoggingInit {
            dir: config.render.log_dir.clone(),
            error,
        }
    })?;
    info!(config = %path.display(), tilesets = config.tilesets.len(), workers, "Starting render");

    let bus = Arc::new(EventBus::new());
    let mut tilesets = Vec::with_capacity(config.tilesets.len());
    for settings in &config.tilesets {
        let mut tileset = build_tileset(settings, &config.render.output_dir);
        tileset.preprocess(&bus)?;
        tilesets.push(Arc::new(tileset));
    }
    let tasks: Vec<Arc<dyn RenderTask>> = tilesets
        .iter()
        .map(|t| Arc::clone(t) as Arc<dyn RenderTask>)
        .collect();

    let resources = Arc::new(DefaultResources {
        cache_size: config.render.cache_size,
    });
    let telemetry = Arc::new(TracingTelemetrySink::default());
    let stats = if workers == 0 {
        SerialDispatcher::new(resources)
            .with_telemetry(telemetry)
            .render_all(&tasks, &bus)?
    } else {
        ParallelDispatcher::new(workers, resources)?
            .with_poll_interval(config.render.poll_interval())
            .with_telemetry(telemetry)
            .render_all(&tasks, &bus)?
    };

    for tileset in &tilesets {
        tileset.finish()?;
    }
    info!(tiles = stats.completed, "Render complete");
    Ok(())
}

fn depth(config: Option<PathBuf>) -> Result<(), CliError> {
    let (_, config) = load_config(config)?;
    for settings in &config.tilesets {
        let tileset = build_tileset(settings, &config.render.output_dir);
        let stored = tileset
            .stored_state()?
            .map_or_else(|| "none".to_string(), |s| s.depth.to_string());
        println!(
            "{}: required depth {}, stored depth {}",
            settings.name,
            tileset.required_depth(),
            stored
        );
    }
    Ok(())
}
