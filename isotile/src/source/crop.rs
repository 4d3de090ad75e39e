//! Chunk source restricted to a bounding box.

use super::{ChunkData, ChunkSource, Mtime, SourceError, StampIter};
use crate::coord::ChunkPos;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Inclusive chunk bounding box in world (x, z) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBounds {
    pub min_x: i64,
    pub min_z: i64,
    pub max_x: i64,
    pub max_z: i64,
}

impl CropBounds {
    /// Creates bounds, swapping corners given in the wrong order.
    pub fn new(x1: i64, z1: i64, x2: i64, z2: i64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_z: z1.min(z2),
            max_x: x1.max(x2),
            max_z: z1.max(z2),
        }
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x && pos.z >= self.min_z && pos.z <= self.max_z
    }
}

impl FromStr for CropBounds {
    type Err = String;

    /// Parses `minx,minz,maxx,maxz`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected 4 comma-separated integers, got {}", parts.len()));
        }
        let mut nums = [0i64; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| format!("'{}' is not an integer", part))?;
        }
        Ok(Self::new(nums[0], nums[1], nums[2], nums[3]))
    }
}

impl fmt::Display for CropBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_x, self.min_z, self.max_x, self.max_z)
    }
}

/// Hides every chunk outside a bounding box.
///
/// Chunks outside the box are invisible to the scanner and the renderer
/// alike, so a cropped map renders as if the rest of the world did not exist.
pub struct CroppedSource {
    inner: Arc<dyn ChunkSource>,
    bounds: CropBounds,
}

impl CroppedSource {
    pub fn new(inner: Arc<dyn ChunkSource>, bounds: CropBounds) -> Self {
        Self { inner, bounds }
    }

    pub fn bounds(&self) -> CropBounds {
        self.bounds
    }
}

impl ChunkSource for CroppedSource {
    fn iterate_all(&self) -> StampIter<'_> {
        let bounds = self.bounds;
        Box::new(
            self.inner
                .iterate_all()
                .filter(move |s| bounds.contains(s.pos)),
        )
    }

    fn iterate_newer_than(&self, time: Mtime) -> StampIter<'_> {
        let bounds = self.bounds;
        Box::new(
            self.inner
                .iterate_newer_than(time)
                .filter(move |s| bounds.contains(s.pos)),
        )
    }

    fn get_mtime(&self, pos: ChunkPos) -> Option<Mtime> {
        if self.bounds.contains(pos) {
            self.inner.get_mtime(pos)
        } else {
            None
        }
    }

    fn load(&self, pos: ChunkPos) -> Result<Arc<ChunkData>, SourceError> {
        if self.bounds.contains(pos) {
            self.inner.load(pos)
        } else {
            Err(SourceError::NotFound(pos))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChunkStamp, MemorySource};

    fn source() -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::new());
        source.insert(ChunkPos::new(0, 0), 1, vec![1]);
        source.insert(ChunkPos::new(5, 5), 2, vec![2]);
        source.insert(ChunkPos::new(-3, 1), 3, vec![3]);
        source
    }

    #[test]
    fn test_crop_bounds_parse() {
        let bounds: CropBounds = "4, -2, -1, 3".parse().unwrap();
        assert_eq!(bounds, CropBounds::new(-1, -2, 4, 3));
        assert_eq!(bounds.to_string(), "-1,-2,4,3");
    }

    #[test]
    fn test_crop_bounds_parse_errors() {
        assert!("1,2,3".parse::<CropBounds>().is_err());
        assert!("1,2,x,4".parse::<CropBounds>().is_err());
    }

    #[test]
    fn test_cropped_source_filters_listing() {
        let cropped = CroppedSource::new(source(), CropBounds::new(-1, -1, 5, 5));
        let stamps: Vec<_> = cropped.iterate_all().collect();
        assert_eq!(
            stamps,
            vec![ChunkStamp::new(0, 0, 1), ChunkStamp::new(5, 5, 2)]
        );
        let newer: Vec<_> = cropped.iterate_newer_than(1).collect();
        assert_eq!(newer, vec![ChunkStamp::new(5, 5, 2)]);
    }

    #[test]
    fn test_cropped_source_hides_outside_chunks() {
        let cropped = CroppedSource::new(source(), CropBounds::new(-1, -1, 5, 5));
        assert_eq!(cropped.get_mtime(ChunkPos::new(-3, 1)), None);
        assert!(matches!(
            cropped.load(ChunkPos::new(-3, 1)),
            Err(SourceError::NotFound(_))
        ));
        assert!(cropped.load(ChunkPos::new(0, 0)).is_ok());
    }
}
