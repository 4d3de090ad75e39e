//! Default renderer drawing each chunk as a flat isometric diamond.

use super::{RenderError, Renderer, World};
use crate::coord::ChunkPos;
use image::{Rgba, RgbaImage};

/// Width of a chunk's top face in pixels.
const FACE_WIDTH: i64 = 384;
/// Height of a chunk's top face in pixels.
const FACE_HEIGHT: i64 = 192;

/// Renders chunks as diamonds coloured from their payload.
///
/// Adjacent chunks tile seamlessly. Output depends only on chunk payloads,
/// so rendering the same world twice yields identical images.
#[derive(Debug, Clone, Default)]
pub struct FlatRenderer;

impl FlatRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Derives a stable colour from a chunk payload.
    pub fn chunk_colour(payload: &[u8]) -> Rgba<u8> {
        // FNV-1a
        let mut hash: u32 = 0x811c_9dc5;
        for &b in payload {
            hash ^= u32::from(b);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        let [r, g, b, _] = hash.to_le_bytes();
        // Keep colours away from black so empty canvas and chunks differ.
        Rgba([r / 2 + 64, g / 2 + 64, b / 2 + 64, 255])
    }
}

fn shade(colour: Rgba<u8>, factor: u16) -> Rgba<u8> {
    let [r, g, b, a] = colour.0;
    let f = |c: u8| ((u16::from(c) * factor) / 100) as u8;
    Rgba([f(r), f(g), f(b), a])
}

impl Renderer for FlatRenderer {
    fn draw_chunk(
        &mut self,
        world: &World<'_>,
        pos: ChunkPos,
        canvas: &mut RgbaImage,
        x: i64,
        y: i64,
    ) -> Result<(), RenderError> {
        let data = world.load(pos)?;
        let lit = Self::chunk_colour(&data.payload);
        let shadowed = shade(lit, 80);

        let (width, height) = (i64::from(canvas.width()), i64::from(canvas.height()));
        let half_w = FACE_WIDTH / 2;
        let half_h = FACE_HEIGHT / 2;

        for ry in 0..FACE_HEIGHT {
            let py = y + ry;
            if py < 0 || py >= height {
                continue;
            }
            let d = if ry < half_h { ry } else { FACE_HEIGHT - 1 - ry };
            let span = (d + 1) * half_w / half_h;
            for rx in (half_w - span)..(half_w + span) {
                let px = x + rx;
                if px < 0 || px >= width {
                    continue;
                }
                let colour = if rx < half_w { shadowed } else { lit };
                canvas.put_pixel(px as u32, py as u32, colour);
            }
        }
        Ok(())
    }
}
