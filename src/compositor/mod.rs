//! Compositor module
//!
//! Combines the frames gathered from every rank into one image.
//!
//! # Architecture
//!
//! - `blend`: per-pixel accumulate and background-resolve operators
//! - `CompositeAccumulator`: the single-owner running composite
//! - `composite_in_order`: drives the accumulator through a `VisibilityOrder`

pub mod accumulator;
pub mod blend;

pub use accumulator::CompositeAccumulator;
pub use blend::{blend_over, resolve_background, DEFAULT_ALPHA_EPSILON, DEFAULT_BACKGROUND};

use crate::frame::{FrameError, RgbaFrame};
use crate::visibility::VisibilityOrder;

/// Errors raised while compositing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    /// A layer's dimensions differ from the accumulator's
    DimensionMismatch { expected: (u32, u32), actual: (u32, u32) },
    /// The order names a rank with no gathered frame
    MissingFrame { rank: usize },
    /// Nothing to composite (a run needs at least one rank)
    NoLayers,
    /// Accumulator could not be allocated
    Frame(FrameError),
}

impl std::fmt::Display for CompositeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositeError::DimensionMismatch { expected, actual } => write!(
                f,
                "Layer is {}x{}, accumulator is {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            CompositeError::MissingFrame { rank } => write!(f, "No frame gathered for rank {}", rank),
            CompositeError::NoLayers => write!(f, "Cannot composite zero layers"),
            CompositeError::Frame(e) => write!(f, "Frame error: {}", e),
        }
    }
}

impl std::error::Error for CompositeError {}

impl From<FrameError> for CompositeError {
    fn from(e: FrameError) -> Self {
        CompositeError::Frame(e)
    }
}

/// Composite `frames` (indexed by rank) in visibility order, then resolve
/// against `background`.
///
/// Every frame must share the dimensions of the first ranked frame.
pub fn composite_in_order(
    order: &VisibilityOrder,
    frames: &[RgbaFrame],
    background: [f32; 3],
    epsilon: f32,
) -> Result<RgbaFrame, CompositeError> {
    let first_rank = order.ranks().next().ok_or(CompositeError::NoLayers)?;
    let first = frames
        .get(first_rank)
        .ok_or(CompositeError::MissingFrame { rank: first_rank })?;

    let mut accumulator = CompositeAccumulator::with_epsilon(first.width(), first.height(), epsilon)?;
    for record in order.records() {
        let frame = frames
            .get(record.rank)
            .ok_or(CompositeError::MissingFrame { rank: record.rank })?;
        tracing::debug!(
            rank = record.rank,
            distance = record.max_distance,
            "Compositing rank"
        );
        accumulator.composite(frame)?;
    }

    Ok(accumulator.resolve(background))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(pixel: [f32; 4]) -> RgbaFrame {
        RgbaFrame::from_samples(1, 1, pixel.to_vec()).unwrap()
    }

    #[test]
    fn test_composite_follows_visibility_order() {
        // Rank 1 is farther and therefore blended first
        let frames = vec![solid([1.0, 0.0, 0.0, 1.0]), solid([0.0, 0.0, 1.0, 0.5])];
        let order = VisibilityOrder::from_distances(&[1.0, 2.0]);
        let out = composite_in_order(&order, &frames, DEFAULT_BACKGROUND, DEFAULT_ALPHA_EPSILON).unwrap();
        assert_eq!(out.pixel(0, 0), [0.5, 0.0, 0.5, 1.0]);

        let order = VisibilityOrder::from_distances(&[2.0, 1.0]);
        let out = composite_in_order(&order, &frames, DEFAULT_BACKGROUND, DEFAULT_ALPHA_EPSILON).unwrap();
        assert_eq!(out.pixel(0, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_transparent_ranks_only_see_background() {
        let frames = vec![solid([0.0; 4]), solid([0.9, 0.9, 0.9, 0.005])];
        let order = VisibilityOrder::from_distances(&[0.0, 3.0]);
        let out = composite_in_order(&order, &frames, DEFAULT_BACKGROUND, DEFAULT_ALPHA_EPSILON).unwrap();
        assert_eq!(out.pixel(0, 0), [0.2, 0.2, 0.2, 1.0]);
    }

    #[test]
    fn test_missing_frame() {
        let frames = vec![solid([0.0; 4])];
        let order = VisibilityOrder::from_distances(&[1.0, 2.0]);
        let err = composite_in_order(&order, &frames, DEFAULT_BACKGROUND, DEFAULT_ALPHA_EPSILON).unwrap_err();
        assert_eq!(err, CompositeError::MissingFrame { rank: 1 });
    }

    #[test]
    fn test_no_layers() {
        let order = VisibilityOrder::from_distances(&[]);
        let err = composite_in_order(&order, &[], DEFAULT_BACKGROUND, DEFAULT_ALPHA_EPSILON).unwrap_err();
        assert_eq!(err, CompositeError::NoLayers);
    }
}
