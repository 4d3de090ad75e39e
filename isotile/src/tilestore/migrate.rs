//! Tree depth migration.
//!
//! When the world outgrows the tree (or shrinks), the existing tiles are
//! moved to their addresses in the new tree with a handful of directory
//! renames per level instead of re-rendering.
//!
//! Growing by one level: the map stays centred, so the old top quadrant `d`
//! becomes quadrant `3 - d` inside the new top quadrant `d`:
//!
//! ```text
//!  before          after
//!  0/ ...          0/3/ ...
//!  0.png           0/3.png
//!  3/ ...          3/0/ ...
//! ```
//!
//! Shrinking does the reverse and discards everything outside the kept
//! quadrants.

use super::TileStoreError;
use crate::coord::TilePath;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Summary of a depth migration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrateResult {
    /// Number of levels added or removed.
    pub levels: u32,
    /// Composite tiles whose content changed and must be redrawn, children
    /// first.
    pub stale_composites: Vec<TilePath>,
}

/// Moves a tree of depth `from` into a tree of depth `to > from`.
pub fn increase_depth(
    root: &Path,
    ext: &str,
    from: u32,
    to: u32,
) -> Result<MigrateResult, TileStoreError> {
    let levels = to.saturating_sub(from);
    if levels == 0 {
        return Ok(MigrateResult::default());
    }
    warn!(root = %root.display(), from, to, "Map grew beyond its bounds, rearranging tiles");

    for _ in 0..levels {
        grow_one_level(root, ext)?;
    }

    // The old top quadrant `d` now sits at [d, 3-d, 3-d, ...].
    let mut stale_composites = Vec::new();
    for k in (0..levels).rev() {
        for d in 0..4u8 {
            let mut digits = vec![d];
            digits.extend(std::iter::repeat(3 - d).take(k as usize));
            stale_composites.push(TilePath::from(digits.as_slice()));
        }
    }
    stale_composites.push(TilePath::root());

    Ok(MigrateResult {
        levels,
        stale_composites,
    })
}

/// Moves a tree of depth `from` into a tree of depth `to < from`.
///
/// Tiles outside the smaller tree are deleted. The top-level composites are
/// removed since their content no longer matches.
pub fn decrease_depth(
    root: &Path,
    ext: &str,
    from: u32,
    to: u32,
) -> Result<MigrateResult, TileStoreError> {
    let levels = from.saturating_sub(to);
    if levels == 0 {
        return Ok(MigrateResult::default());
    }
    warn!(root = %root.display(), from, to, "Map shrank, discarding tiles outside the new bounds");

    for _ in 0..levels {
        shrink_one_level(root, ext)?;
    }
    remove_file_if_exists(&root.join(format!("base.{}", ext)))?;

    Ok(MigrateResult {
        levels,
        stale_composites: vec![TilePath::root()],
    })
}

fn grow_one_level(root: &Path, ext: &str) -> Result<(), TileStoreError> {
    for d in 0..4u8 {
        let inner = 3 - d;
        let staging = root.join(format!("new{}", d));
        fs::create_dir_all(&staging).map_err(|e| TileStoreError::io(&staging, e))?;

        rename_if_exists(
            &root.join(format!("{}.{}", d, ext)),
            &staging.join(format!("{}.{}", inner, ext)),
        )?;
        rename_if_exists(&root.join(d.to_string()), &staging.join(inner.to_string()))?;

        let target = root.join(d.to_string());
        fs::rename(&staging, &target).map_err(|e| TileStoreError::io(&target, e))?;
    }
    Ok(())
}

fn shrink_one_level(root: &Path, ext: &str) -> Result<(), TileStoreError> {
    for d in 0..4u8 {
        let keep = 3 - d;
        let quadrant = root.join(d.to_string());
        let staging = root.join(format!("new{}", d));
        let staging_image = root.join(format!("new{}.{}", d, ext));

        rename_if_exists(&quadrant.join(keep.to_string()), &staging)?;
        rename_if_exists(&quadrant.join(format!("{}.{}", keep, ext)), &staging_image)?;

        match fs::remove_dir_all(&quadrant) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TileStoreError::io(&quadrant, e)),
        }
        rename_if_exists(&staging, &quadrant)?;

        let image = root.join(format!("{}.{}", d, ext));
        remove_file_if_exists(&image)?;
        rename_if_exists(&staging_image, &image)?;
    }
    Ok(())
}

fn rename_if_exists(from: &Path, to: &Path) -> Result<(), TileStoreError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TileStoreError::io(from, e)),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), TileStoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TileStoreError::io(path, e)),
    }
}
