//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use image::Rgba;
use std::path::PathBuf;

use super::defaults::DEFAULT_JPEG_QUALITY;
use super::file::ConfigFileError;
use super::settings::{ConfigFile, TileSetSettings};
use crate::render::TileFormat;

/// Sections named `tileset.<name>` each describe one tile-set.
pub const TILESET_SECTION_PREFIX: &str = "tileset.";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [render] section
    if let Some(section) = ini.section(Some("render")) {
        if let Some(v) = non_empty(section, "output_dir") {
            config.render.output_dir = expand_tilde(v);
        }
        if let Some(v) = section.get("workers") {
            config.render.workers =
                parse_number(v, "render", "workers", "must be a non-negative integer")?;
        }
        if let Some(v) = non_empty(section, "log_dir") {
            config.render.log_dir = expand_tilde(v);
        }
        if let Some(v) = section.get("poll_interval_ms") {
            let ms: u64 = parse_number(
                v,
                "render",
                "poll_interval_ms",
                "must be a positive integer (milliseconds)",
            )?;
            if ms == 0 {
                return Err(invalid("render", "poll_interval_ms", v, "must be greater than zero"));
            }
            config.render.poll_interval_ms = ms;
        }
        if let Some(v) = section.get("cache_size") {
            config.render.cache_size = parse_number(
                v,
                "render",
                "cache_size",
                "must be a non-negative integer (chunks)",
            )?;
        }
    }

    // [tileset.<name>] sections
    for (name, section) in ini.iter() {
        let Some(name) = name else { continue };
        let Some(tileset) = name.strip_prefix(TILESET_SECTION_PREFIX) else {
            continue;
        };
        if tileset.is_empty() {
            return Err(invalid(name, "", name, "tile-set name must not be empty"));
        }
        config.tilesets.push(parse_tileset(name, tileset, section)?);
    }

    Ok(config)
}

fn parse_tileset(
    section_name: &str,
    name: &str,
    section: &Properties,
) -> Result<TileSetSettings, ConfigFileError> {
    let source = non_empty(section, "source").ok_or_else(|| ConfigFileError::MissingValue {
        section: section_name.to_string(),
        key: "source".to_string(),
    })?;
    let mut settings = TileSetSettings::new(name, expand_tilde(source));

    if let Some(v) = section.get("mode") {
        settings.mode = v
            .trim()
            .parse()
            .map_err(|reason: String| invalid(section_name, "mode", v, &reason))?;
    }

    if let Some(v) = section.get("rerender_prob") {
        let prob: f64 = v
            .trim()
            .parse()
            .map_err(|_| invalid(section_name, "rerender_prob", v, "must be a number"))?;
        if !(0.0..=1.0).contains(&prob) {
            return Err(invalid(section_name, "rerender_prob", v, "must be between 0.0 and 1.0"));
        }
        settings.rerender_prob = prob;
    }

    if let Some(v) = section.get("image_format") {
        settings.image_format = v
            .trim()
            .parse()
            .map_err(|reason: String| invalid(section_name, "image_format", v, &reason))?;
    }

    if let Some(v) = section.get("jpeg_quality") {
        let quality: u8 = v
            .trim()
            .parse()
            .ok()
            .filter(|q| (1..=100).contains(q))
            .ok_or_else(|| invalid(section_name, "jpeg_quality", v, "must be an integer from 1 to 100"))?;
        if let TileFormat::Jpeg { .. } = settings.image_format {
            settings.image_format = TileFormat::Jpeg { quality };
        }
    } else if let TileFormat::Jpeg { .. } = settings.image_format {
        settings.image_format = TileFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        };
    }

    if let Some(v) = section.get("bgcolor") {
        settings.bgcolor = parse_bgcolor(v)
            .ok_or_else(|| invalid(section_name, "bgcolor", v, "expected '#rrggbb' or '#rrggbbaa'"))?;
    }

    if let Some(v) = section.get("crop") {
        let crop = v
            .parse()
            .map_err(|reason: String| invalid(section_name, "crop", v, &reason))?;
        settings.crop = Some(crop);
    }

    if let Some(v) = non_empty(section, "changelist") {
        settings.changelist = Some(expand_tilde(v));
    }

    if let Some(v) = non_empty(section, "optimizer") {
        settings.optimizer = Some(v.to_string());
    }

    Ok(settings)
}

/// Parses `#rrggbb` (transparent) or `#rrggbbaa`. The `#` may be left out,
/// since some INI readers take it for a comment.
pub fn parse_bgcolor(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim();
    let hex = value.strip_prefix('#').unwrap_or(value);
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 0 };
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    value: &str,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::scan::RequestedMode;
    use crate::source::CropBounds;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.render.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.render.cache_size, DEFAULT_CACHE_SIZE);
        assert!(config.tilesets.is_empty());
    }

    #[test]
    fn test_render_section() {
        let config = parse(
            "[render]\noutput_dir = /srv/maps\nworkers = 0\npoll_interval_ms = 25\ncache_size = 0\n",
        )
        .unwrap();
        assert_eq!(config.render.output_dir, PathBuf::from("/srv/maps"));
        assert_eq!(config.render.workers, 0);
        assert_eq!(config.render.poll_interval_ms, 25);
        assert_eq!(config.render.cache_size, 0);
    }

    #[test]
    fn test_invalid_workers() {
        let err = parse("[render]\nworkers = many\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "render");
                assert_eq!(key, "workers");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(parse("[render]\npoll_interval_ms = 0\n").is_err());
    }

    #[test]
    fn test_tileset_section() {
        let config = parse(
            "[tileset.night]\n\
             source = /srv/world\n\
             mode = force\n\
             rerender_prob = 0.25\n\
             image_format = jpeg\n\
             jpeg_quality = 80\n\
             bgcolor = 102030\n\
             crop = 10,-10,-10,10\n\
             changelist = /tmp/changes.txt\n\
             optimizer = optipng -o2\n",
        )
        .unwrap();

        let t = &config.tilesets[0];
        assert_eq!(t.name, "night");
        assert_eq!(t.source, PathBuf::from("/srv/world"));
        assert_eq!(t.mode, RequestedMode::Force);
        assert_eq!(t.rerender_prob, 0.25);
        assert_eq!(t.image_format, TileFormat::Jpeg { quality: 80 });
        assert_eq!(t.bgcolor, Rgba([0x10, 0x20, 0x30, 0]));
        assert_eq!(t.crop, Some(CropBounds::new(-10, -10, 10, 10)));
        assert_eq!(t.changelist, Some(PathBuf::from("/tmp/changes.txt")));
        assert_eq!(t.optimizer.as_deref(), Some("optipng -o2"));
    }

    #[test]
    fn test_tilesets_keep_file_order() {
        let config = parse("[tileset.b]\nsource = b\n\n[tileset.a]\nsource = a\n").unwrap();
        let names: Vec<_> = config.tilesets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_tileset_defaults() {
        let config = parse("[tileset.day]\nsource = /srv/world\n").unwrap();
        let t = &config.tilesets[0];
        assert_eq!(t.mode, RequestedMode::Incremental);
        assert_eq!(t.image_format, TileFormat::Png);
        assert_eq!(t.rerender_prob, 0.0);
        assert!(t.crop.is_none());
    }

    #[test]
    fn test_jpeg_without_quality_uses_default() {
        let config = parse("[tileset.day]\nsource = w\nimage_format = jpg\n").unwrap();
        assert_eq!(
            config.tilesets[0].image_format,
            TileFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY
            }
        );
    }

    #[test]
    fn test_missing_source() {
        let err = parse("[tileset.day]\nmode = force\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::MissingValue { .. }));
    }

    #[test]
    fn test_invalid_tileset_values() {
        assert!(parse("[tileset.d]\nsource = w\nmode = sometimes\n").is_err());
        assert!(parse("[tileset.d]\nsource = w\nrerender_prob = 1.5\n").is_err());
        assert!(parse("[tileset.d]\nsource = w\nimage_format = gif\n").is_err());
        assert!(parse("[tileset.d]\nsource = w\njpeg_quality = 0\n").is_err());
        assert!(parse("[tileset.d]\nsource = w\nbgcolor = red\n").is_err());
        assert!(parse("[tileset.d]\nsource = w\ncrop = 1,2,3\n").is_err());
    }

    #[test]
    fn test_parse_bgcolor() {
        assert_eq!(parse_bgcolor("#1a1a1a"), Some(Rgba([0x1a, 0x1a, 0x1a, 0])));
        assert_eq!(parse_bgcolor("#ffffff80"), Some(Rgba([255, 255, 255, 0x80])));
        assert_eq!(parse_bgcolor("1a1a1a"), Some(Rgba([0x1a, 0x1a, 0x1a, 0])));
        assert_eq!(parse_bgcolor("#12345"), None);
        assert_eq!(parse_bgcolor("#gg0000"), None);
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/maps");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("maps"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
