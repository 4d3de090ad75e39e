//! Coordinate conversion module
//!
//! Maps between world chunk positions, the 45° rotated diagonal grid used by
//! the isometric projection, and quadtree paths addressing output tiles.

mod types;

pub use types::{
    ChunkPos, ColRow, CoordError, DiagBounds, TilePath, CHUNK_ROW_REACH, MAX_DEPTH, MIN_DEPTH,
    TILE_COL_SPAN, TILE_ROW_SPAN,
};

/// Rotates a chunk position into the diagonal grid.
#[inline]
pub fn chunk_to_col_row(chunk: ChunkPos) -> ColRow {
    ColRow {
        col: chunk.x + chunk.z,
        row: chunk.z - chunk.x,
    }
}

/// Inverse of [`chunk_to_col_row`].
///
/// Only coordinates whose col and row share parity correspond to a chunk.
#[inline]
pub fn col_row_to_chunk(coord: ColRow) -> Result<ChunkPos, CoordError> {
    if (coord.col - coord.row).rem_euclid(2) != 0 {
        return Err(CoordError::NoSuchChunk(coord));
    }
    Ok(ChunkPos {
        x: (coord.col - coord.row) / 2,
        z: (coord.col + coord.row) / 2,
    })
}

/// Returns the render-tiles a chunk column draws into.
///
/// A chunk in an even column straddles two tile columns; an odd one sits in
/// the middle of a single tile. Vertically it reaches from the tile holding
/// its top face down [`CHUNK_ROW_REACH`] rows, plus the tile above when the
/// chunk sits on a tile's top edge.
pub fn tiles_touched_by_chunk(chunk: ColRow) -> TouchedTiles {
    let tile_col = chunk.col - chunk.col.rem_euclid(TILE_COL_SPAN);
    let tile_row = chunk.row - chunk.row.rem_euclid(TILE_ROW_SPAN);

    let (cols, col_count) = if chunk.col.rem_euclid(TILE_COL_SPAN) == 0 {
        ([tile_col - TILE_COL_SPAN, tile_col], 2)
    } else {
        ([tile_col, tile_col], 1)
    };

    let row_start = if chunk.row.rem_euclid(TILE_ROW_SPAN) == 0 {
        tile_row - TILE_ROW_SPAN
    } else {
        tile_row
    };

    TouchedTiles {
        cols,
        col_count,
        col_index: 0,
        row_start,
        row_end: tile_row + CHUNK_ROW_REACH,
        row: row_start,
    }
}

/// Iterator over the tiles touched by one chunk, column by column.
#[derive(Debug, Clone)]
pub struct TouchedTiles {
    cols: [i64; 2],
    col_count: usize,
    col_index: usize,
    row_start: i64,
    row_end: i64,
    row: i64,
}

impl Iterator for TouchedTiles {
    type Item = ColRow;

    fn next(&mut self) -> Option<Self::Item> {
        while self.col_index < self.col_count {
            if self.row <= self.row_end {
                let tile = ColRow {
                    col: self.cols[self.col_index],
                    row: self.row,
                };
                self.row += TILE_ROW_SPAN;
                return Some(tile);
            }
            self.col_index += 1;
            self.row = self.row_start;
        }
        None
    }
}

/// Returns true if the chunk at `chunk` draws into the render-tile `tile`.
pub fn chunk_touches_tile(chunk: ColRow, tile: ColRow) -> bool {
    let tile_col = chunk.col - chunk.col.rem_euclid(TILE_COL_SPAN);
    let col_ok = if chunk.col.rem_euclid(TILE_COL_SPAN) == 0 {
        tile.col == tile_col || tile.col == tile_col - TILE_COL_SPAN
    } else {
        tile.col == tile_col
    };
    if !col_ok {
        return false;
    }

    let tile_row = chunk.row - chunk.row.rem_euclid(TILE_ROW_SPAN);
    let row_start = if chunk.row.rem_euclid(TILE_ROW_SPAN) == 0 {
        tile_row - TILE_ROW_SPAN
    } else {
        tile_row
    };
    tile.row >= row_start
        && tile.row <= tile_row + CHUNK_ROW_REACH
        && (tile.row - row_start).rem_euclid(TILE_ROW_SPAN) == 0
}

/// Returns every chunk position that draws into a render-tile.
///
/// This is the exact inverse of [`tiles_touched_by_chunk`]. Positions are
/// returned back to front (ascending row, then col), which is the order they
/// must be drawn in.
pub fn chunks_in_tile(tile: ColRow) -> Vec<ColRow> {
    let mut chunks = Vec::new();
    let row_min = tile.row - CHUNK_ROW_REACH - TILE_ROW_SPAN;
    let row_max = tile.row + 2 * TILE_ROW_SPAN;
    for row in row_min..=row_max {
        for col in tile.col..=tile.col + TILE_COL_SPAN {
            if (col - row).rem_euclid(2) != 0 {
                continue;
            }
            let candidate = ColRow { col, row };
            if chunk_touches_tile(candidate, tile) {
                chunks.push(candidate);
            }
        }
    }
    chunks
}

/// Radius of a tree of the given depth, in chunk columns and rows.
#[inline]
pub fn tree_radius(depth: u32) -> (i64, i64) {
    let x = 1i64 << depth;
    (x, 2 * x)
}

/// Returns true if a render-tile lies inside a tree of the given depth.
#[inline]
pub fn tile_in_tree(tile: ColRow, depth: u32) -> bool {
    let (xr, yr) = tree_radius(depth);
    tile.col >= -xr && tile.col < xr && tile.row >= -yr && tile.row < yr
}

impl TilePath {
    /// Computes the path of a render-tile in a tree of the given depth.
    ///
    /// Starting from the tree bounds, each level picks the quadrant that holds
    /// the tile relative to the midpoint and halves the bounds.
    pub fn from_col_row(tile: ColRow, depth: u32) -> Result<TilePath, CoordError> {
        if !tile.is_tile_aligned() {
            return Err(CoordError::NotTileAligned(tile));
        }
        if !tile_in_tree(tile, depth) {
            return Err(CoordError::OutOfBounds { coord: tile, depth });
        }

        let (xr, yr) = tree_radius(depth);
        let (mut col_lo, mut col_hi) = (-xr, xr);
        let (mut row_lo, mut row_hi) = (-yr, yr);
        let mut path = TilePath::root();

        for _ in 0..depth {
            let col_mid = col_lo + (col_hi - col_lo) / 2;
            let row_mid = row_lo + (row_hi - row_lo) / 2;
            let mut quadrant = 0u8;
            if tile.col >= col_mid {
                quadrant += 1;
                col_lo = col_mid;
            } else {
                col_hi = col_mid;
            }
            if tile.row >= row_mid {
                quadrant += 2;
                row_lo = row_mid;
            } else {
                row_hi = row_mid;
            }
            path.push(quadrant);
        }
        Ok(path)
    }

    /// Reconstructs the (col, row) of the render-tile at this path.
    ///
    /// The path must be full length: its length is taken as the tree depth.
    pub fn to_col_row(&self) -> ColRow {
        let (xr, yr) = tree_radius(self.len() as u32);
        let mut col = -xr;
        let mut row = -yr;
        let mut x_size = xr;
        let mut y_size = yr;
        for &q in self.digits() {
            if q == 1 || q == 3 {
                col += x_size;
            }
            if q == 2 || q == 3 {
                row += y_size;
            }
            x_size /= 2;
            y_size /= 2;
        }
        ColRow { col, row }
    }
}

/// Computes the tree depth needed to hold every chunk inside `bounds`.
///
/// The row bound keeps a [`CHUNK_ROW_REACH`] margin below the lowest chunk
/// because tall columns draw well below their own row.
pub fn required_depth(bounds: &DiagBounds) -> u32 {
    for p in MIN_DEPTH..=MAX_DEPTH {
        let (xr, yr) = tree_radius(p);
        if xr >= bounds.max_col
            && -xr <= bounds.min_col
            && yr >= bounds.max_row + CHUNK_ROW_REACH
            && -yr <= bounds.min_row
        {
            return p;
        }
    }
    MAX_DEPTH
}
