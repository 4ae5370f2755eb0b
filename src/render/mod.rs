//! Local rendering seam
//!
//! The renderer is an external collaborator: given a shard and the shared
//! camera it must deterministically produce one RGBA frame of the agreed
//! size, linear and not gamma-corrected, with alpha as coverage. A shard with
//! no elements must produce a fully transparent frame.
//!
//! `render_local` is the only way to obtain a `RenderedFrame`, and the
//! transport only accepts a `RenderedFrame`, so a rank cannot start sending
//! before its local render has finished.

pub mod camera;
pub mod splat;

pub use camera::Camera;
pub use splat::SplatRenderer;

use crate::frame::RgbaFrame;
use crate::partition::Shard;

/// Rendering failure reported by a `Renderer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError(pub String);

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Render error: {}", self.0)
    }
}

impl std::error::Error for RenderError {}

/// Produces one frame per shard
pub trait Renderer {
    fn render(&self, shard: &Shard, camera: &Camera, width: u32, height: u32) -> Result<RgbaFrame, RenderError>;
}

/// A completed local render, ready for transport
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    rank: usize,
    frame: RgbaFrame,
}

impl RenderedFrame {
    pub(crate) fn new(rank: usize, frame: RgbaFrame) -> Self {
        Self { rank, frame }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn frame(&self) -> &RgbaFrame {
        &self.frame
    }

    pub(crate) fn into_frame(self) -> RgbaFrame {
        self.frame
    }
}

/// Render this rank's shard and check the result has the agreed dimensions
pub fn render_local<R>(renderer: &R, shard: &Shard, camera: &Camera, width: u32, height: u32) -> Result<RenderedFrame, RenderError>
where
    R: Renderer + ?Sized,
{
    let frame = renderer.render(shard, camera, width, height)?;
    if frame.dimensions() != (width, height) {
        return Err(RenderError(format!(
            "renderer produced {}x{}, expected {}x{}",
            frame.width(),
            frame.height(),
            width,
            height
        )));
    }
    if shard.is_empty() && !frame.is_fully_transparent() {
        return Err(RenderError(format!(
            "rank {} has no elements but rendered visible pixels",
            shard.rank()
        )));
    }
    Ok(RenderedFrame::new(shard.rank(), frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::block_grid;

    struct FixedSize(u32, u32);

    impl Renderer for FixedSize {
        fn render(&self, _shard: &Shard, _camera: &Camera, _w: u32, _h: u32) -> Result<RgbaFrame, RenderError> {
            RgbaFrame::transparent(self.0, self.1).map_err(|e| RenderError(e.to_string()))
        }
    }

    #[test]
    fn test_render_local_tags_rank() {
        let blocks = block_grid(2);
        let shard = Shard::select(&blocks, 1, 3);
        let rendered = render_local(&SplatRenderer::default(), &shard, &Camera::default(), 16, 16).unwrap();
        assert_eq!(rendered.rank(), 1);
        assert_eq!(rendered.frame().dimensions(), (16, 16));
    }

    #[test]
    fn test_render_local_rejects_wrong_dimensions() {
        let blocks = block_grid(1);
        let shard = Shard::select(&blocks, 0, 1);
        let err = render_local(&FixedSize(8, 8), &shard, &Camera::default(), 16, 16).unwrap_err();
        assert!(err.0.contains("8x8"));
    }
}
