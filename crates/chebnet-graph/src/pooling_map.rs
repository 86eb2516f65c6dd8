//! Pooling index maps: which fine nodes each coarse node aggregates.
//!
//! A map is a row-major table with one row per coarse node and `width`
//! slots per row. A slot holds a fine node index or [`PAD`]:
//!
//! ```text
//! coarse 0 → [ 0, 2 ]        matched pair
//! coarse 1 → [ 1, PAD ]      singleton
//! coarse 2 → [ PAD, PAD ]    padding node (carries the null signal)
//! ```
//!
//! A single coarsening step yields width 2; composing maps multiplies widths.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Sentinel slot: contributes the pooling fill value, never a fine node.
pub const PAD: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolingMap {
    width: usize,
    fine_nodes: usize,
    slots: Vec<usize>,
}

impl PoolingMap {
    /// Build a map from a flat row-major slot table.
    ///
    /// Every non-[`PAD`] slot must index a fine node, and no fine node may
    /// appear twice.
    pub fn new(width: usize, fine_nodes: usize, slots: Vec<usize>) -> Result<Self> {
        if width == 0 {
            return Err(GraphError::Configuration("pooling map width must be ≥ 1".into()));
        }
        if slots.len() % width != 0 {
            return Err(GraphError::Configuration(format!(
                "{} slots do not form rows of width {width}",
                slots.len()
            )));
        }
        let mut seen = vec![false; fine_nodes];
        for &s in slots.iter().filter(|&&s| s != PAD) {
            if s >= fine_nodes {
                return Err(GraphError::Configuration(format!(
                    "slot {s} is out of range for {fine_nodes} fine nodes"
                )));
            }
            if std::mem::replace(&mut seen[s], true) {
                return Err(GraphError::Configuration(format!(
                    "fine node {s} is pooled by more than one slot"
                )));
            }
        }
        Ok(Self { width, fine_nodes, slots })
    }

    /// Width-2 map from coarsening pairs. Callers guarantee validity.
    pub(crate) fn from_pairs(fine_nodes: usize, pairs: &[[usize; 2]]) -> Self {
        Self {
            width: 2,
            fine_nodes,
            slots: pairs.iter().flatten().copied().collect(),
        }
    }

    /// Slots per coarse node.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Node count of the fine level the slots index into.
    #[inline]
    pub fn fine_nodes(&self) -> usize {
        self.fine_nodes
    }

    /// Node count of the coarse level (number of rows).
    #[inline]
    pub fn coarse_nodes(&self) -> usize {
        self.slots.len() / self.width
    }

    #[inline]
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    /// Slots of coarse node `i`.
    pub fn entry(&self, i: usize) -> &[usize] {
        &self.slots[i * self.width..(i + 1) * self.width]
    }

    pub fn entries(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.slots.chunks(self.width)
    }

    /// Number of slots that reference a fine node.
    pub fn covered(&self) -> usize {
        self.slots.iter().filter(|&&s| s != PAD).count()
    }

    /// Inverse view: for each fine node, the coarse node that pools it.
    /// Fine padding nodes map to `None`.
    pub fn assignment(&self) -> Vec<Option<usize>> {
        let mut owner = vec![None; self.fine_nodes];
        for (coarse, row) in self.entries().enumerate() {
            for &s in row.iter().filter(|&&s| s != PAD) {
                owner[s] = Some(coarse);
            }
        }
        owner
    }

    /// Chain `self` (level i+1 → level i) with `next` (level i+2 → level i+1)
    /// into one map from level i+2 straight to level i.
    ///
    /// Each slot of `next` is replaced by the whole row of `self` it points
    /// at; a `PAD` slot expands to a row of `PAD`s.
    pub fn compose(&self, next: &PoolingMap) -> Result<PoolingMap> {
        if next.fine_nodes != self.coarse_nodes() {
            return Err(GraphError::Configuration(format!(
                "cannot chain pooling maps: next level pools {} nodes but this level has {} coarse nodes",
                next.fine_nodes,
                self.coarse_nodes()
            )));
        }

        let width = self.width * next.width;
        let mut slots = Vec::with_capacity(next.coarse_nodes() * width);
        for &s in &next.slots {
            if s == PAD {
                slots.extend(std::iter::repeat(PAD).take(self.width));
            } else {
                slots.extend_from_slice(self.entry(s));
            }
        }

        Ok(PoolingMap { width, fine_nodes: self.fine_nodes, slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_assignment() {
        let map = PoolingMap::from_pairs(4, &[[0, 2], [1, 3]]);
        assert_eq!(map.coarse_nodes(), 2);
        assert_eq!(map.entry(1), &[1, 3]);
        assert_eq!(map.assignment(), vec![Some(0), Some(1), Some(0), Some(1)]);
        assert_eq!(map.covered(), 4);
    }

    #[test]
    fn padding_rows_cover_nothing() {
        let map = PoolingMap::from_pairs(3, &[[0, 1], [2, PAD], [PAD, PAD], [PAD, PAD]]);
        assert_eq!(map.coarse_nodes(), 4);
        assert_eq!(map.covered(), 3);
        assert_eq!(map.assignment(), vec![Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn compose_chases_indices() {
        // level 0 (4 nodes) → level 1 (2 nodes) → level 2 (1 node)
        let first = PoolingMap::from_pairs(4, &[[0, 2], [1, 3]]);
        let second = PoolingMap::from_pairs(2, &[[1, 0]]);
        let combined = first.compose(&second).unwrap();
        assert_eq!(combined.width(), 4);
        assert_eq!(combined.fine_nodes(), 4);
        assert_eq!(combined.entry(0), &[1, 3, 0, 2]);
    }

    #[test]
    fn compose_expands_pad() {
        let first = PoolingMap::from_pairs(3, &[[0, 1], [2, PAD]]);
        let second = PoolingMap::from_pairs(2, &[[1, PAD], [0, PAD]]);
        let combined = first.compose(&second).unwrap();
        assert_eq!(combined.slots(), &[2, PAD, PAD, PAD, 0, 1, PAD, PAD]);
        assert_eq!(combined.covered(), 3);
    }

    #[test]
    fn compose_rejects_broken_chain() {
        let first = PoolingMap::from_pairs(4, &[[0, 2], [1, 3]]);
        let second = PoolingMap::from_pairs(4, &[[0, 1], [2, 3]]);
        assert!(matches!(first.compose(&second), Err(GraphError::Configuration(_))));
    }

    #[test]
    fn new_rejects_duplicates_and_out_of_range() {
        assert!(PoolingMap::new(2, 3, vec![0, 0]).is_err());
        assert!(PoolingMap::new(2, 3, vec![0, 3]).is_err());
        assert!(PoolingMap::new(2, 3, vec![0, 1, 2]).is_err());
        assert!(PoolingMap::new(0, 3, vec![]).is_err());
        assert!(PoolingMap::new(2, 3, vec![0, 1, 2, PAD]).is_ok());
    }
}
