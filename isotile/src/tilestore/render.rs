//! Drawing render-tiles from chunks and composites from their children.

use super::{FileReplacer, TileOutcome, TileStore, TileStoreError};
use crate::coord::{chunks_in_tile, col_row_to_chunk, TilePath};
use crate::render::{RenderError, Renderer, TileFormat, World, TILE_SIZE};
use crate::signals::{Signal, SignalSender};
use crate::source::Mtime;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::fs;
use tracing::{debug, warn};

/// Chunk rows are drawn this many pixels apart.
const ROW_STEP: i64 = 96;
/// Chunk columns are drawn this many pixels apart.
const COL_STEP: i64 = 192;

/// Worker-owned resources needed to draw a render-tile.
pub struct LeafContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub world: World<'a>,
    pub signals: &'a SignalSender,
}

impl TileStore {
    /// Renders the tile at `path`, leaf or composite by its length.
    pub fn render_tile(
        &self,
        path: &TilePath,
        ctx: &mut LeafContext<'_>,
    ) -> Result<TileOutcome, TileStoreError> {
        if path.len() == self.depth as usize {
            self.render_leaf(path, ctx)
        } else {
            self.render_composite(path, ctx.signals)
        }
    }

    /// Draws a render-tile from every chunk that reaches it.
    ///
    /// Chunks are drawn back to front. A corrupt chunk is skipped; a fatal
    /// renderer error is returned. With no chunks left the tile is deleted.
    pub fn render_leaf(
        &self,
        path: &TilePath,
        ctx: &mut LeafContext<'_>,
    ) -> Result<TileOutcome, TileStoreError> {
        let tile = path.to_col_row();

        let chunks: Vec<_> = chunks_in_tile(tile)
            .into_iter()
            .filter_map(|coord| {
                let pos = col_row_to_chunk(coord).ok()?;
                let mtime = ctx.world.mtime(pos)?;
                Some((coord, pos, mtime))
            })
            .collect();

        let Some(max_mtime) = chunks.iter().map(|&(_, _, m)| m).max() else {
            return self.remove_empty(path, ctx.signals);
        };

        let mut canvas = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, self.background);
        for (coord, pos, _) in &chunks {
            let x = -COL_STEP + (coord.col - tile.col) * COL_STEP;
            let y = -ROW_STEP + (coord.row - tile.row) * ROW_STEP;
            match ctx
                .renderer
                .draw_chunk(&ctx.world, *pos, &mut canvas, x, y)
            {
                Ok(()) => {}
                Err(RenderError::Corrupt { pos, reason }) => {
                    debug!(tileset = %self.name, chunk = %pos, reason = %reason, "Skipping corrupt chunk");
                    ctx.signals.emit(Signal::ChunkSkipped {
                        tileset: self.name.clone(),
                        chunk: pos,
                        reason,
                    });
                }
                Err(fatal) => return Err(fatal.into()),
            }
        }

        Ok(self.save(path, &canvas, max_mtime, ctx.signals))
    }

    /// Stitches up to four child tiles into their parent.
    ///
    /// Each existing child is scaled to half size into its quadrant. A child
    /// that fails to decode is deleted and left out. The composite carries the
    /// newest child mtime; with no usable child it is deleted.
    pub fn render_composite(
        &self,
        path: &TilePath,
        signals: &SignalSender,
    ) -> Result<TileOutcome, TileStoreError> {
        let half = TILE_SIZE / 2;
        let mut canvas = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, self.background);
        let mut max_mtime: Option<Mtime> = None;

        for (quadrant, child) in path.children().iter().enumerate() {
            let Some(mtime) = self.tile_mtime(child) else {
                continue;
            };
            let image = match TileFormat::decode(&self.tile_path(child)) {
                Ok(image) => image,
                Err(e) => {
                    warn!(
                        tileset = %self.name,
                        path = %child,
                        error = %e,
                        "Child tile is unreadable, deleting it"
                    );
                    self.delete_tile(child, signals)?;
                    continue;
                }
            };

            let small = imageops::resize(&image, half, half, FilterType::Triangle);
            let x = if quadrant % 2 == 1 { half } else { 0 };
            let y = if quadrant >= 2 { half } else { 0 };
            imageops::overlay(&mut canvas, &small, i64::from(x), i64::from(y));
            max_mtime = Some(max_mtime.map_or(mtime, |m| m.max(mtime)));
        }

        match max_mtime {
            Some(mtime) => Ok(self.save(path, &canvas, mtime, signals)),
            None => {
                debug!(tileset = %self.name, path = %path, "Composite has no children");
                self.remove_empty(path, signals)
            }
        }
    }

    fn remove_empty(
        &self,
        path: &TilePath,
        signals: &SignalSender,
    ) -> Result<TileOutcome, TileStoreError> {
        if self.delete_tile(path, signals)? {
            Ok(TileOutcome::Deleted)
        } else {
            Ok(TileOutcome::Absent)
        }
    }

    /// Encodes, optimizes and atomically places a tile.
    ///
    /// Failures only cost this tile, which keeps its previous image and is
    /// picked up again by a later run.
    fn save(
        &self,
        path: &TilePath,
        canvas: &RgbaImage,
        mtime: Mtime,
        signals: &SignalSender,
    ) -> TileOutcome {
        let dest = self.tile_path(path);
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(tileset = %self.name, path = %path, error = %e, "Cannot create tile directory");
                return TileOutcome::Failed;
            }
        }

        let replacer = FileReplacer::new(&dest, self.caps);
        if let Err(e) = self.format.encode(canvas, replacer.path()) {
            warn!(tileset = %self.name, path = %path, error = %e, "Failed to encode tile");
            return TileOutcome::Failed;
        }
        if let Err(e) = self.optimizer.optimize(replacer.path()) {
            warn!(tileset = %self.name, path = %path, error = %e, "Optimizer failed, keeping unoptimized tile");
        }
        if let Err(e) = replacer.commit(mtime) {
            warn!(tileset = %self.name, path = %path, error = %e, "Failed to move tile into place");
            return TileOutcome::Failed;
        }

        signals.emit(Signal::TileWritten {
            tileset: self.name.clone(),
            tile: self.relative_path(path).to_string_lossy().into_owned(),
            mtime,
        });
        TileOutcome::Written { mtime }
    }
}
