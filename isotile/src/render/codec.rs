//! Tile image encoding and optional post-processing.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while encoding or decoding a tile image.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("optimizer '{program}' failed: {reason}")]
    Optimizer { program: String, reason: String },
}

/// On-disk format of output tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileFormat {
    #[default]
    Png,
    Jpeg { quality: u8 },
}

impl TileFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg { .. } => "jpg",
        }
    }

    /// Encodes a canvas to `path`, replacing any existing file.
    pub fn encode(&self, canvas: &RgbaImage, path: &Path) -> Result<(), CodecError> {
        let mut writer = BufWriter::new(File::create(path)?);
        match self {
            TileFormat::Png => {
                let mut buffer = io::Cursor::new(Vec::new());
                canvas.write_to(&mut buffer, image::ImageFormat::Png)?;
                writer.write_all(buffer.get_ref())?;
            }
            TileFormat::Jpeg { quality } => {
                let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut writer, *quality).encode_image(&rgb)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Decodes a tile written in any supported format.
    pub fn decode(path: &Path) -> Result<RgbaImage, CodecError> {
        Ok(image::open(path)?.to_rgba8())
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg { quality: 95 }),
            other => Err(format!("unknown image format '{}' (expected png or jpeg)", other)),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileFormat::Png => write!(f, "png"),
            TileFormat::Jpeg { quality } => write!(f, "jpeg (quality {})", quality),
        }
    }
}

/// Post-processes a freshly encoded tile in place.
///
/// Failures are reported but never abort a run; the tile is simply left
/// unoptimized.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &str;

    fn optimize(&self, path: &Path) -> Result<(), CodecError>;
}

/// Optimizer that does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoOptimizer;

impl Optimizer for NoOptimizer {
    fn name(&self) -> &str {
        "none"
    }

    fn optimize(&self, _path: &Path) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Runs an external program with the tile path as its last argument.
#[derive(Debug, Clone)]
pub struct CommandOptimizer {
    program: String,
    args: Vec<String>,
}

impl CommandOptimizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parses a whitespace-separated command line such as `optipng -o2`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl Optimizer for CommandOptimizer {
    fn name(&self) -> &str {
        &self.program
    }

    fn optimize(&self, path: &Path) -> Result<(), CodecError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .map_err(|e| CodecError::Optimizer {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(CodecError::Optimizer {
                program: self.program.clone(),
                reason: format!("exited with {}", status),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 30, y as u8 * 30, 100, 255]))
    }

    #[test]
    fn test_png_round_trip_is_lossless() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.png");
        TileFormat::Png.encode(&sample(), &path).unwrap();
        assert_eq!(TileFormat::decode(&path).unwrap(), sample());
    }

    #[test]
    fn test_jpeg_encode_decodes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.jpg");
        TileFormat::Jpeg { quality: 90 }
            .encode(&sample(), &path)
            .unwrap();
        let decoded = TileFormat::decode(&path).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(TileFormat::decode(&path).is_err());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("PNG".parse::<TileFormat>().unwrap(), TileFormat::Png);
        assert_eq!(
            "jpeg".parse::<TileFormat>().unwrap(),
            TileFormat::Jpeg { quality: 95 }
        );
        assert!("gif".parse::<TileFormat>().is_err());
        assert_eq!(TileFormat::Jpeg { quality: 1 }.extension(), "jpg");
    }

    #[test]
    fn test_command_optimizer_parse() {
        let opt = CommandOptimizer::from_command_line("optipng -o2 -quiet").unwrap();
        assert_eq!(opt.name(), "optipng");
        assert_eq!(opt.args, vec!["-o2", "-quiet"]);
        assert!(CommandOptimizer::from_command_line("   ").is_none());
    }

    #[test]
    fn test_command_optimizer_missing_program() {
        let temp = TempDir::new().unwrap();
        let opt = CommandOptimizer::new("isotile-no-such-program", vec![]);
        let result = opt.optimize(&temp.path().join("x.png"));
        assert!(matches!(result, Err(CodecError::Optimizer { .. })));
    }
}
