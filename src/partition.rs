//! Shard partitioning
//!
//! Elements are dealt round-robin: element `i` belongs to rank
//! `i % num_processes`. The assignment needs no communication, and every rank
//! computes the bounding box of the elements it owns.

use glam::DVec3;

use crate::dataset::Block;

/// Axis-aligned bounding box.
///
/// An empty box is stored inverted (`min = +inf`, `max = -inf`) so that
/// including any finite box yields that box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// The inverted sentinel box owned by a rank with no elements
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// True when the box contains no points (min > max on some axis)
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Grow to include another box
    pub fn include(&mut self, other: &Bounds) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// The eight corners, min/max selected per axis
    pub fn corners(&self) -> [DVec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            DVec3::new(lo.x, lo.y, lo.z),
            DVec3::new(lo.x, lo.y, hi.z),
            DVec3::new(lo.x, hi.y, lo.z),
            DVec3::new(lo.x, hi.y, hi.z),
            DVec3::new(hi.x, lo.y, lo.z),
            DVec3::new(hi.x, lo.y, hi.z),
            DVec3::new(hi.x, hi.y, lo.z),
            DVec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// Rank that owns global element `index`.
///
/// Panics if `num_processes` is zero; a run always has at least one rank.
pub fn owner_of(index: usize, num_processes: usize) -> usize {
    index % num_processes
}

/// Number of elements rank `rank` receives out of `total`
pub fn shard_len(total: usize, rank: usize, num_processes: usize) -> usize {
    if rank >= total {
        0
    } else {
        (total - rank).div_ceil(num_processes)
    }
}

/// The elements one rank owns, plus their combined bounds
#[derive(Debug, Clone)]
pub struct Shard {
    rank: usize,
    blocks: Vec<Block>,
    bounds: Bounds,
}

impl Shard {
    /// Select this rank's elements from the global set.
    ///
    /// Walks `rank, rank + n, rank + 2n, ...` so the shard is built without
    /// looking at any other rank's elements.
    pub fn select(all: &[Block], rank: usize, num_processes: usize) -> Self {
        let blocks: Vec<Block> = all
            .iter()
            .skip(rank)
            .step_by(num_processes.max(1))
            .copied()
            .collect();

        let mut bounds = Bounds::empty();
        for block in &blocks {
            bounds.include(&block.bounds);
        }

        tracing::debug!(
            rank,
            elements = blocks.len(),
            min = ?bounds.min,
            max = ?bounds.max,
            "Shard selected"
        );

        Self { rank, blocks, bounds }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
