//! Demo block dataset
//!
//! A regular grid of axis-aligned blocks filling the unit cube. Each block
//! carries a scalar the demo renderer maps to color. This is just enough
//! input for the binary to exercise partitioning and compositing.

use glam::DVec3;

use crate::partition::Bounds;

/// One global data element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    /// Global element index, used for round-robin assignment
    pub index: usize,
    /// Spatial extent of the block
    pub bounds: Bounds,
    /// Normalized scalar value in [0, 1]
    pub scalar: f64,
}

/// Build `blocks_per_axis`³ blocks tiling the unit cube, in x-fastest order.
///
/// The scalar is a radial falloff from the cube center so neighbouring
/// blocks differ visibly once rendered.
pub fn block_grid(blocks_per_axis: u32) -> Vec<Block> {
    let n = blocks_per_axis as usize;
    if n == 0 {
        return Vec::new();
    }

    let step = 1.0 / blocks_per_axis as f64;
    let center = DVec3::splat(0.5);
    let max_radius = center.length();

    let mut blocks = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let min = DVec3::new(i as f64, j as f64, k as f64) * step;
                let max = min + DVec3::splat(step);
                let mid = (min + max) * 0.5;
                let scalar = 1.0 - (mid - center).length() / max_radius;
                blocks.push(Block {
                    index: blocks.len(),
                    bounds: Bounds::new(min, max),
                    scalar: scalar.clamp(0.0, 1.0),
                });
            }
        }
    }
    blocks
}
