//! Validated sparse adjacency in CSR (Compressed Sparse Row) form.
//!
//! Rows are stored in index order with sorted column indices, so every
//! traversal of a [`Graph`] visits edges in the same order on every run.
//! Coarsening relies on this for bit-identical hierarchies.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Relative tolerance accepted between `A[i,j]` and `A[j,i]`.
///
/// The comparison is scaled by `max(1, |A[i,j]|, |A[j,i]|)`.
pub const SYMMETRY_TOLERANCE: f64 = 1e-6;

/// Symmetric, non-negative weighted adjacency with zero diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Number of nodes.
    n: usize,
    /// Row offsets, length `n + 1`. Row `i` spans `col_idx[offsets[i]..offsets[i+1]]`.
    offsets: Vec<usize>,
    /// Neighbour indices, sorted within each row.
    col_idx: Vec<usize>,
    /// Edge weights parallel to `col_idx`.
    weights: Vec<f64>,
}

impl Graph {
    /// Graph with `n` isolated nodes.
    pub fn empty(n: usize) -> Self {
        Self {
            n,
            offsets: vec![0; n + 1],
            col_idx: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Validate a dense adjacency matrix and store it sparsely.
    ///
    /// Asymmetry within [`SYMMETRY_TOLERANCE`] is accepted and averaged
    /// away, so the stored matrix is exactly `(A + Aᵀ) / 2`.
    pub fn from_dense(a: ArrayView2<'_, f64>) -> Result<Self> {
        let (rows, cols) = a.dim();
        if rows != cols {
            return Err(GraphError::InvalidGraph(format!(
                "adjacency is {rows}×{cols}, expected a square matrix"
            )));
        }

        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); rows];
        for i in 0..rows {
            let diag = a[[i, i]];
            check_weight(i, i, diag)?;
            if diag != 0.0 {
                return Err(self_loop(i, diag));
            }
            for j in (i + 1)..rows {
                let (w_ij, w_ji) = (a[[i, j]], a[[j, i]]);
                check_weight(i, j, w_ij)?;
                check_weight(j, i, w_ji)?;
                let w = symmetrize(i, j, w_ij, w_ji)?;
                if w > 0.0 {
                    adj[i].push((j, w));
                    adj[j].push((i, w));
                }
            }
        }

        Ok(Self::from_rows(adj))
    }

    /// Build from `(row, col, weight)` matrix entries.
    ///
    /// Duplicate entries are summed before validation. Both directions of an
    /// edge must be present (up to tolerance), exactly as in a dense matrix.
    pub fn from_triplets(n: usize, entries: &[(usize, usize, f64)]) -> Result<Self> {
        let mut summed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for &(i, j, w) in entries {
            if i >= n || j >= n {
                return Err(GraphError::InvalidGraph(format!(
                    "entry ({i}, {j}) is out of range for {n} nodes"
                )));
            }
            check_weight(i, j, w)?;
            *summed.entry((i, j)).or_insert(0.0) += w;
        }

        // Canonical (low, high) pair → (A[low,high], A[high,low]).
        let mut pairs: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();
        for (&(i, j), &w) in &summed {
            if i == j {
                if w != 0.0 {
                    return Err(self_loop(i, w));
                }
                continue;
            }
            let slot = pairs.entry((i.min(j), i.max(j))).or_insert((0.0, 0.0));
            if i < j {
                slot.0 = w;
            } else {
                slot.1 = w;
            }
        }

        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (&(i, j), &(w_ij, w_ji)) in &pairs {
            let w = symmetrize(i, j, w_ij, w_ji)?;
            if w > 0.0 {
                adj[i].push((j, w));
                adj[j].push((i, w));
            }
        }

        Ok(Self::from_rows(adj))
    }

    /// Assemble from per-row neighbour lists that are already symmetric.
    pub(crate) fn from_rows(mut rows: Vec<Vec<(usize, f64)>>) -> Self {
        let n = rows.len();
        let nnz = rows.iter().map(Vec::len).sum();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);
        offsets.push(0);

        for row in &mut rows {
            row.sort_by_key(|&(j, _)| j);
            for &(j, w) in row.iter() {
                col_idx.push(j);
                weights.push(w);
            }
            offsets.push(col_idx.len());
        }

        Self { n, offsets, col_idx, weights }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.n
    }

    /// Stored non-zeros (each undirected edge counts twice).
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// Undirected edge count.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.col_idx.len() / 2
    }

    /// `(neighbour, weight)` pairs of node `i`, ascending by neighbour.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.offsets[i]..self.offsets[i + 1];
        self.col_idx[span.clone()]
            .iter()
            .copied()
            .zip(self.weights[span].iter().copied())
    }

    /// Weighted degree `d_i = Σ_j A_ij`.
    pub fn degree(&self, i: usize) -> f64 {
        self.weights[self.offsets[i]..self.offsets[i + 1]].iter().sum()
    }

    pub fn degrees(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.degree(i)).collect()
    }

    /// `A[i, j]`, zero when no edge is stored.
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        let span = self.offsets[i]..self.offsets[i + 1];
        match self.col_idx[span.clone()].binary_search(&j) {
            Ok(pos) => self.weights[span.start + pos],
            Err(_) => 0.0,
        }
    }

    pub fn is_isolated(&self, i: usize) -> bool {
        self.offsets[i] == self.offsets[i + 1]
    }

    /// Same graph with `extra` isolated nodes appended at the tail.
    pub fn with_padding(&self, extra: usize) -> Self {
        let mut padded = self.clone();
        let last = self.col_idx.len();
        padded.offsets.extend(std::iter::repeat(last).take(extra));
        padded.n += extra;
        padded
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n, self.n));
        for i in 0..self.n {
            for (j, w) in self.neighbors(i) {
                dense[[i, j]] = w;
            }
        }
        dense
    }
}

fn check_weight(i: usize, j: usize, w: f64) -> Result<()> {
    if !w.is_finite() {
        return Err(GraphError::InvalidGraph(format!(
            "non-finite weight {w} at ({i}, {j})"
        )));
    }
    if w < 0.0 {
        return Err(GraphError::InvalidGraph(format!(
            "negative weight {w} at ({i}, {j})"
        )));
    }
    Ok(())
}

fn symmetrize(i: usize, j: usize, w_ij: f64, w_ji: f64) -> Result<f64> {
    let scale = 1.0_f64.max(w_ij.abs()).max(w_ji.abs());
    if (w_ij - w_ji).abs() > SYMMETRY_TOLERANCE * scale {
        return Err(GraphError::InvalidGraph(format!(
            "asymmetric weights: A[{i},{j}] = {w_ij}, A[{j},{i}] = {w_ji}"
        )));
    }
    Ok(0.5 * (w_ij + w_ji))
}

fn self_loop(i: usize, w: f64) -> GraphError {
    GraphError::InvalidGraph(format!("self-loop of weight {w} on node {i}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn path4() -> Array2<f64> {
        array![
            [0.0, 1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
        ]
    }

    #[test]
    fn dense_roundtrip_preserves_weights() {
        let a = path4();
        let g = Graph::from_dense(a.view()).unwrap();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.to_dense(), a);
    }

    #[test]
    fn degrees_are_row_sums() {
        let g = Graph::from_dense(path4().view()).unwrap();
        assert_eq!(g.degrees(), vec![2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn neighbors_are_sorted() {
        let g = Graph::from_dense(path4().view()).unwrap();
        let n0: Vec<usize> = g.neighbors(0).map(|(j, _)| j).collect();
        assert_eq!(n0, vec![1, 2]);
        assert_eq!(g.weight(0, 2), 1.0);
        assert_eq!(g.weight(0, 3), 0.0);
    }

    #[test]
    fn rejects_non_square() {
        let a = Array2::<f64>::zeros((3, 4));
        let err = Graph::from_dense(a.view()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidGraph(_)));
    }

    #[test]
    fn rejects_negative_weight() {
        let a = array![[0.0, -1.0], [-1.0, 0.0]];
        assert!(matches!(
            Graph::from_dense(a.view()),
            Err(GraphError::InvalidGraph(msg)) if msg.contains("negative")
        ));
    }

    #[test]
    fn rejects_nan_weight() {
        let a = array![[0.0, f64::NAN], [f64::NAN, 0.0]];
        assert!(Graph::from_dense(a.view()).is_err());
    }

    #[test]
    fn rejects_self_loop() {
        let a = array![[1.0, 0.0], [0.0, 0.0]];
        assert!(matches!(
            Graph::from_dense(a.view()),
            Err(GraphError::InvalidGraph(msg)) if msg.contains("self-loop")
        ));
    }

    #[test]
    fn rejects_asymmetry_beyond_tolerance() {
        let a = array![[0.0, 1.0], [0.5, 0.0]];
        assert!(matches!(
            Graph::from_dense(a.view()),
            Err(GraphError::InvalidGraph(msg)) if msg.contains("asymmetric")
        ));
    }

    #[test]
    fn small_asymmetry_is_averaged() {
        let a = array![[0.0, 1.0], [1.0 + 1e-9, 0.0]];
        let g = Graph::from_dense(a.view()).unwrap();
        assert_eq!(g.weight(0, 1), g.weight(1, 0));
    }

    #[test]
    fn triplets_sum_duplicates() {
        let g = Graph::from_triplets(
            3,
            &[(0, 1, 0.5), (0, 1, 0.5), (1, 0, 1.0), (1, 2, 2.0), (2, 1, 2.0)],
        )
        .unwrap();
        assert_eq!(g.weight(0, 1), 1.0);
        assert_eq!(g.weight(2, 1), 2.0);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn triplets_reject_missing_mirror() {
        let err = Graph::from_triplets(2, &[(0, 1, 1.0)]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidGraph(_)));
    }

    #[test]
    fn triplets_reject_out_of_range() {
        assert!(Graph::from_triplets(2, &[(0, 2, 1.0), (2, 0, 1.0)]).is_err());
    }

    #[test]
    fn padding_appends_isolated_nodes() {
        let g = Graph::from_dense(path4().view()).unwrap().with_padding(4);
        assert_eq!(g.node_count(), 8);
        assert_eq!(g.edge_count(), 3);
        assert!((4..8).all(|i| g.is_isolated(i)));
        assert_eq!(g.degree(7), 0.0);
    }
}
