//! Deterministic splat renderer
//!
//! Stands in for a real volume renderer. Each block's box is projected to its
//! screen-space rectangle and filled with a colormapped, low-opacity splat.
//! Blocks are drawn far to near with straight-alpha over blending, so the
//! frame a rank produces depends only on its shard and the camera.

use glam::DVec3;

use super::{Camera, RenderError, Renderer};
use crate::frame::{Pixel, RgbaFrame};
use crate::partition::Shard;

/// Renders block shards as flat rectangles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatRenderer {
    /// Opacity given to a block with scalar 1.0
    pub max_opacity: f32,
}

impl Default for SplatRenderer {
    fn default() -> Self {
        Self { max_opacity: 0.35 }
    }
}

impl Renderer for SplatRenderer {
    fn render(&self, shard: &Shard, camera: &Camera, width: u32, height: u32) -> Result<RgbaFrame, RenderError> {
        let mut frame = RgbaFrame::transparent(width, height).map_err(|e| RenderError(e.to_string()))?;
        if shard.is_empty() {
            return Ok(frame);
        }

        let view_projection = camera.view_projection_matrix(width, height);

        let mut blocks: Vec<_> = shard.blocks().iter().collect();
        blocks.sort_by(|a, b| {
            let da = center(a.bounds.min, a.bounds.max).distance(camera.position);
            let db = center(b.bounds.min, b.bounds.max).distance(camera.position);
            db.total_cmp(&da).then_with(|| a.index.cmp(&b.index))
        });

        for block in blocks {
            let projected: Vec<(f64, f64)> = block
                .bounds
                .corners()
                .iter()
                .filter_map(|&c| camera.project(&view_projection, c, width, height))
                .collect();
            if projected.len() < 8 {
                continue;
            }

            let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
            let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for &(x, y) in &projected {
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x);
                y1 = y1.max(y);
            }

            let x_start = x0.floor().max(0.0) as u32;
            let y_start = y0.floor().max(0.0) as u32;
            let x_end = (x1.ceil().min(width as f64)).max(0.0) as u32;
            let y_end = (y1.ceil().min(height as f64)).max(0.0) as u32;

            let color = colormap(block.scalar as f32, self.max_opacity);
            for y in y_start..y_end {
                for x in x_start..x_end {
                    let dst = frame.pixel(x, y);
                    frame.set_pixel(x, y, straight_over(color, dst));
                }
            }
        }

        Ok(frame)
    }
}

fn center(min: DVec3, max: DVec3) -> DVec3 {
    (min + max) * 0.5
}

/// Straight-alpha source-over destination
fn straight_over(src: Pixel, dst: Pixel) -> Pixel {
    let a = src[3] + dst[3] * (1.0 - src[3]);
    if a <= 0.0 {
        return [0.0; 4];
    }
    let mix = |s: f32, d: f32| (s * src[3] + d * dst[3] * (1.0 - src[3])) / a;
    [mix(src[0], dst[0]), mix(src[1], dst[1]), mix(src[2], dst[2]), a]
}

/// Black-red-yellow ramp with opacity rising alongside the scalar
fn colormap(t: f32, max_opacity: f32) -> Pixel {
    let t = t.clamp(0.0, 1.0);
    let r = (t * 2.0).min(1.0);
    let g = (t * 2.0 - 1.0).clamp(0.0, 1.0);
    let b = (0.5 - t).max(0.0) * 0.6;
    [r, g, b, t * max_opacity]
}
