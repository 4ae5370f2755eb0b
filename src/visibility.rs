//! Visibility ordering
//!
//! Each rank reduces its shard bounds to a single depth, the distance from
//! the camera to the farthest box corner. After the all-gather every rank
//! sorts the same records into the same back-to-front order.
//!
//! One depth per shard is a painter's-algorithm approximation. It is correct
//! only when shards do not interleave along the view direction; overlapping
//! shards are composited in whole-shard order, not per-pixel depth order.

use glam::DVec3;
use serde::Serialize;

use crate::partition::Bounds;

/// A rank and the depth used to order it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub rank: usize,
    pub max_distance: f64,
}

/// Distance from `camera` to the farthest corner of `bounds`.
///
/// An empty box yields 0.0. Its rank renders a transparent frame, so its
/// place in the order does not affect any pixel.
pub fn max_corner_distance(camera: DVec3, bounds: &Bounds) -> f64 {
    if bounds.is_empty() {
        return 0.0;
    }
    bounds
        .corners()
        .iter()
        .map(|corner| corner.distance(camera))
        .fold(0.0, f64::max)
}

/// Total back-to-front order over every rank in a run
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityOrder {
    records: Vec<ProcessRecord>,
}

impl VisibilityOrder {
    /// Order ranks from the gathered distances, where `distances[r]` belongs
    /// to rank `r`.
    ///
    /// Farthest first; equal distances keep ascending rank order.
    pub fn from_distances(distances: &[f64]) -> Self {
        let records = distances
            .iter()
            .enumerate()
            .map(|(rank, &max_distance)| ProcessRecord { rank, max_distance })
            .collect();
        Self::from_records(records)
    }

    pub fn from_records(mut records: Vec<ProcessRecord>) -> Self {
        records.sort_by(|a, b| {
            b.max_distance
                .total_cmp(&a.max_distance)
                .then_with(|| a.rank.cmp(&b.rank))
        });
        Self { records }
    }

    /// Records in compositing order (back first)
    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    /// Ranks in compositing order
    pub fn ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.iter().map(|r| r.rank)
    }

    /// Position of `rank` in the order, used for debug file names
    pub fn position_of(&self, rank: usize) -> Option<usize> {
        self.records.iter().position(|r| r.rank == rank)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_distances_break_ties_by_rank() {
        let order = VisibilityOrder::from_distances(&[5.0, 5.0, 2.0]);
        assert_eq!(order.ranks().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_farthest_first() {
        let order = VisibilityOrder::from_distances(&[1.0, 3.0, 2.0, 3.0]);
        assert_eq!(order.ranks().collect::<Vec<_>>(), vec![1, 3, 2, 0]);
        assert_eq!(order.position_of(0), Some(3));
        assert_eq!(order.position_of(3), Some(1));
        assert_eq!(order.position_of(9), None);
    }

    #[test]
    fn test_order_is_independent_of_input_order() {
        let records = vec![
            ProcessRecord { rank: 2, max_distance: 4.0 },
            ProcessRecord { rank: 0, max_distance: 4.0 },
            ProcessRecord { rank: 1, max_distance: 9.0 },
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(
            VisibilityOrder::from_records(records),
            VisibilityOrder::from_records(reversed)
        );
    }

    #[test]
    fn test_order_covers_every_rank_once() {
        let distances: Vec<f64> = (0..17).map(|r| ((r * 7) % 5) as f64).collect();
        let order = VisibilityOrder::from_distances(&distances);
        let mut ranks: Vec<usize> = order.ranks().collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_max_corner_distance() {
        let bounds = Bounds::new(DVec3::ZERO, DVec3::ONE);
        let camera = DVec3::splat(1.5);
        // Farthest corner is the origin
        let expected = (3.0f64 * 1.5 * 1.5).sqrt();
        assert!((max_corner_distance(camera, &bounds) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_bounds_distance_is_zero() {
        let distance = max_corner_distance(DVec3::splat(1.5), &Bounds::empty());
        assert_eq!(distance, 0.0);
        assert!(!distance.is_nan());
    }
}
