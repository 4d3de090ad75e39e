//! Coordinate type definitions

use std::fmt;

/// Smallest tree depth ever used, even for an empty world.
pub const MIN_DEPTH: u32 = 2;

/// Largest supported tree depth.
pub const MAX_DEPTH: u32 = 32;

/// Chunk columns spanned by one render-tile.
pub const TILE_COL_SPAN: i64 = 2;

/// Chunk rows spanned by one render-tile.
pub const TILE_ROW_SPAN: i64 = 4;

/// How far (in chunk rows) a chunk column reaches below its own row.
///
/// Chunk columns are tall, so in the isometric projection one column overlaps
/// the eight render-tile rows below the one that holds its top face.
pub const CHUNK_ROW_REACH: i64 = 32;

/// Position of a chunk column in world (x, z) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i64,
    pub z: i64,
}

impl ChunkPos {
    pub fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// A point in the diagonal (col, row) grid.
///
/// Chunks and tiles share this space: a chunk at world `(x, z)` sits at
/// `(x + z, z - x)`, and a render-tile is named by the chunk in its upper-left
/// corner, so tile coordinates always have an even `col` and a `row` divisible
/// by four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColRow {
    pub col: i64,
    pub row: i64,
}

impl ColRow {
    pub fn new(col: i64, row: i64) -> Self {
        Self { col, row }
    }

    /// Returns true if this coordinate names a render-tile.
    #[inline]
    pub fn is_tile_aligned(&self) -> bool {
        self.col.rem_euclid(TILE_COL_SPAN) == 0 && self.row.rem_euclid(TILE_ROW_SPAN) == 0
    }
}

impl fmt::Display for ColRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Bounding box of a set of chunks in diagonal space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagBounds {
    pub min_col: i64,
    pub max_col: i64,
    pub min_row: i64,
    pub max_row: i64,
}

impl Default for DiagBounds {
    fn default() -> Self {
        Self {
            min_col: 0,
            max_col: 0,
            min_row: 0,
            max_row: 0,
        }
    }
}

impl DiagBounds {
    /// Computes the bounds of the given chunks.
    ///
    /// An empty iterator yields the zero box, which maps to the minimum depth.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = ChunkPos>,
    {
        let mut bounds: Option<DiagBounds> = None;
        for chunk in chunks {
            let c = super::chunk_to_col_row(chunk);
            bounds = Some(match bounds {
                None => DiagBounds {
                    min_col: c.col,
                    max_col: c.col,
                    min_row: c.row,
                    max_row: c.row,
                },
                Some(b) => DiagBounds {
                    min_col: b.min_col.min(c.col),
                    max_col: b.max_col.max(c.col),
                    min_row: b.min_row.min(c.row),
                    max_row: b.max_row.max(c.row),
                },
            });
        }
        bounds.unwrap_or_default()
    }
}

/// Address of a tile in the quadtree.
///
/// Each digit selects a quadrant: 0 upper-left, 1 upper-right, 2 lower-left,
/// 3 lower-right. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TilePath(Vec<u8>);

impl TilePath {
    /// The root of the tree.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from quadrant digits.
    pub fn from_digits(digits: impl Into<Vec<u8>>) -> Result<Self, CoordError> {
        let digits = digits.into();
        if let Some(&bad) = digits.iter().find(|&&d| d > 3) {
            return Err(CoordError::InvalidQuadrant(bad));
        }
        Ok(Self(digits))
    }

    pub fn digits(&self) -> &[u8] {
        &self.0
    }

    /// Number of digits, i.e. the distance from the root.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the path of the given child quadrant.
    pub fn child(&self, quadrant: u8) -> Self {
        debug_assert!(quadrant < 4);
        let mut digits = Vec::with_capacity(self.0.len() + 1);
        digits.extend_from_slice(&self.0);
        digits.push(quadrant);
        Self(digits)
    }

    /// Returns the four children in quadrant order.
    pub fn children(&self) -> [TilePath; 4] {
        [self.child(0), self.child(1), self.child(2), self.child(3)]
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub(crate) fn push(&mut self, quadrant: u8) {
        self.0.push(quadrant);
    }

    pub(crate) fn pop(&mut self) -> Option<u8> {
        self.0.pop()
    }
}

impl fmt::Display for TilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "base");
        }
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl From<&[u8]> for TilePath {
    /// Converts raw digits. Digits above 3 are a programming error.
    fn from(digits: &[u8]) -> Self {
        debug_assert!(digits.iter().all(|&d| d < 4));
        Self(digits.to_vec())
    }
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Coordinate does not name a render-tile
    NotTileAligned(ColRow),
    /// Coordinate lies outside a tree of the given depth
    OutOfBounds { coord: ColRow, depth: u32 },
    /// Diagonal coordinate with mixed parity has no chunk
    NoSuchChunk(ColRow),
    /// Path digit outside 0..=3
    InvalidQuadrant(u8),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::NotTileAligned(c) => write!(
                f,
                "Coordinate {} is not tile aligned (col must be even, row a multiple of 4)",
                c
            ),
            CoordError::OutOfBounds { coord, depth } => {
                write!(f, "Coordinate {} lies outside a tree of depth {}", coord, depth)
            }
            CoordError::NoSuchChunk(c) => {
                write!(f, "Coordinate {} has mixed parity and names no chunk", c)
            }
            CoordError::InvalidQuadrant(d) => {
                write!(f, "Invalid quadrant digit: {} (must be 0-3)", d)
            }
        }
    }
}

impl std::error::Error for CoordError {}
