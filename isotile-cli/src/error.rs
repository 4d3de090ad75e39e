//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and the exit code.

use isotile::config::ConfigFileError;
use isotile::dispatch::DispatchError;
use isotile::tileset::TileSetError;
use std::fmt;
use std::path::PathBuf;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit { dir: PathBuf, error: std::io::Error },
    /// Configuration error
    Config(ConfigFileError),
    /// No tile-sets configured
    NoTileSets(PathBuf),
    /// Preparing or finishing a tile-set failed
    TileSet(TileSetError),
    /// Rendering failed
    Render(DispatchError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::NoTileSets(_) => {
                eprintln!();
                eprintln!("Add a section like this to the config file:");
                eprintln!("  [tileset.day]");
                eprintln!("  source = /path/to/world");
            }
            CliError::Render(_) => {
                eprintln!();
                eprintln!("The render was aborted. The next run checks every tile and picks up");
                eprintln!("where this one stopped.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit { dir, error } => write!(
                f,
                "Failed to initialize logging in '{}': {}",
                dir.display(),
                error
            ),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::NoTileSets(path) => {
                write!(f, "No tile-sets configured in '{}'", path.display())
            }
            CliError::TileSet(e) => write!(f, "{}", e),
            CliError::Render(e) => write!(f, "Render failed: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit { error, .. } => Some(error),
            CliError::Config(e) => Some(e),
            CliError::TileSet(e) => Some(e),
            CliError::Render(e) => Some(e),
            CliError::NoTileSets(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<TileSetError> for CliError {
    fn from(e: TileSetError) -> Self {
        CliError::TileSet(e)
    }
}

impl From<DispatchError> for CliError {
    fn from(e: DispatchError) -> Self {
        CliError::Render(e)
    }
}
