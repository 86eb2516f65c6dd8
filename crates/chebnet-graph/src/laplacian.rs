//! Rescaled normalized graph Laplacian.
//!
//! ## Construction
//!
//! ```text
//! L  = I − D^{−½} A D^{−½}          eigenvalues ∈ [0, 2]
//! L̃ = (2 / λ_max) · L − I          eigenvalues ∈ [−1, 1]
//! ```
//!
//! `L̃` is the operator consumed by the Chebyshev recurrence; its spectral
//! radius must not exceed 1 or the recurrence `T_k = 2 L̃ T_{k−1} − T_{k−2}`
//! blows up with `k`.
//!
//! ## λ_max
//!
//! | Strategy                    | λ_max                                        |
//! |-----------------------------|----------------------------------------------|
//! | [`LambdaMax::Bound`]        | 2.0, the analytic bound (default)            |
//! | [`LambdaMax::Estimate`]     | converged `θ + ‖r‖`, +1 %, ≤ 2.0; else 2.0   |
//!
//! Isolated nodes (degree 0) use `d^{−½} = 0`, so their row of `L` is the
//! identity row.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::Graph;

// ─────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────

/// Upper bound on the largest eigenvalue of the normalized Laplacian.
pub const LAMBDA_MAX_BOUND: f64 = 2.0;

/// Relative inflation applied on top of a converged residual bound.
pub const ESTIMATE_MARGIN: f64 = 0.01;

/// Loosest relative residual accepted as convergence, whatever the caller asks.
pub const MAX_RESIDUAL: f64 = 1e-4;

const POWER_ITERATION_SEED: u64 = 0x00c0_ffee;

// ─────────────────────────────────────────────
// LambdaMax
// ─────────────────────────────────────────────

/// How the spectral rescaling picks λ_max.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LambdaMax {
    #[default]
    Bound,
    Estimate { iterations: usize, tolerance: f64 },
}

// ─────────────────────────────────────────────
// ScaledLaplacian
// ─────────────────────────────────────────────

/// Sparse `L̃ = (2/λ_max) L − I` in CSR form with `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledLaplacian {
    /// Number of nodes.
    n: usize,
    offsets: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f32>,
    /// λ_max the operator was rescaled with.
    lambda_max: f64,
}

/// Build the rescaled Laplacian of `graph`.
pub fn build_laplacian(graph: &Graph, strategy: LambdaMax) -> ScaledLaplacian {
    ScaledLaplacian::build(graph, strategy)
}

impl ScaledLaplacian {
    pub fn build(graph: &Graph, strategy: LambdaMax) -> Self {
        let n = graph.node_count();
        let inv_sqrt: Vec<f64> = graph
            .degrees()
            .into_iter()
            .map(|d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
            .collect();

        // D^{−½} A D^{−½}, row by row (no diagonal: the graph has none).
        let normalized: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| {
                graph
                    .neighbors(i)
                    .map(|(j, w)| (j, w * inv_sqrt[i] * inv_sqrt[j]))
                    .collect()
            })
            .collect();

        let lambda_max = match strategy {
            LambdaMax::Bound => LAMBDA_MAX_BOUND,
            LambdaMax::Estimate { iterations, tolerance } => {
                estimate_lambda_max(&normalized, iterations, tolerance)
            }
        };

        // L̃ = (2/λ)(I − N) − I = (2/λ − 1) I − (2/λ) N
        let scale = 2.0 / lambda_max;
        let diag = scale - 1.0;

        let nnz: usize = normalized.iter().map(Vec::len).sum();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::with_capacity(nnz + n);
        let mut values = Vec::with_capacity(nnz + n);
        offsets.push(0);

        for (i, row) in normalized.iter().enumerate() {
            let mut diag_pending = diag != 0.0;
            for &(j, v) in row {
                if diag_pending && j > i {
                    col_idx.push(i);
                    values.push(diag as f32);
                    diag_pending = false;
                }
                col_idx.push(j);
                values.push((-scale * v) as f32);
            }
            if diag_pending {
                col_idx.push(i);
                values.push(diag as f32);
            }
            offsets.push(col_idx.len());
        }

        tracing::debug!(nodes = n, nnz = col_idx.len(), lambda_max, "scaled Laplacian built");

        Self { n, offsets, col_idx, values, lambda_max }
    }

    /// Validate a dense adjacency, then build.
    pub fn from_adjacency(adjacency: ArrayView2<'_, f64>, strategy: LambdaMax) -> Result<Self> {
        let graph = Graph::from_dense(adjacency)?;
        Ok(Self::build(&graph, strategy))
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    #[inline]
    pub fn lambda_max(&self) -> f64 {
        self.lambda_max
    }

    /// `out = L̃ · x`.
    pub fn apply(&self, x: ArrayView1<'_, f32>, mut out: ArrayViewMut1<'_, f32>) {
        debug_assert_eq!(x.len(), self.n);
        debug_assert_eq!(out.len(), self.n);
        for i in 0..self.n {
            let mut acc = 0.0f32;
            for p in self.offsets[i]..self.offsets[i + 1] {
                acc += self.values[p] * x[self.col_idx[p]];
            }
            out[i] = acc;
        }
    }

    /// Apply `L̃` along the node axis (axis 2) of a `(batch, channels, nodes)`
    /// signal.
    pub fn apply_signal(&self, x: ArrayView3<'_, f32>) -> Array3<f32> {
        let mut out = Array3::zeros(x.raw_dim());
        for (src, dst) in x.lanes(Axis(2)).into_iter().zip(out.lanes_mut(Axis(2))) {
            self.apply(src, dst);
        }
        out
    }

    /// Power-iteration estimate of `max |λ(L̃)|`.
    ///
    /// For a symmetric operator `‖L̃x‖ ≤ ρ(L̃)` for every unit `x`, so the
    /// estimate never exceeds the true radius beyond float rounding.
    pub fn spectral_radius(&self, iterations: usize) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let mut x = seeded_unit_vector(self.n);
        let mut radius = 0.0;
        for _ in 0..iterations {
            let y = self.apply_f64(&x);
            let norm = l2(&y);
            radius = norm;
            if norm <= f64::MIN_POSITIVE {
                break;
            }
            x = y.into_iter().map(|v| v / norm).collect();
        }
        radius
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let mut dense = Array2::zeros((self.n, self.n));
        for i in 0..self.n {
            for p in self.offsets[i]..self.offsets[i + 1] {
                dense[[i, self.col_idx[p]]] = self.values[p];
            }
        }
        dense
    }

    fn apply_f64(&self, x: &[f64]) -> Vec<f64> {
        (0..self.n)
            .map(|i| {
                (self.offsets[i]..self.offsets[i + 1])
                    .map(|p| self.values[p] as f64 * x[self.col_idx[p]])
                    .sum()
            })
            .collect()
    }
}

// ─────────────────────────────────────────────
// λ_max estimation
// ─────────────────────────────────────────────

/// Power iteration on `L = I − N`, accepted only once it has converged.
///
/// For a unit `x` with Rayleigh quotient `θ = xᵀLx` and residual
/// `r = Lx − θx`, some eigenvalue of `L` lies within `‖r‖` of `θ`. Power
/// iteration drives `x` toward the top eigenvector, so `θ + ‖r‖` covers
/// λ_max from above. The iteration stops once
/// `‖r‖ ≤ min(tolerance, MAX_RESIDUAL) · max(θ, 1)`; if that never happens
/// the analytic bound is returned instead of an underestimate.
fn estimate_lambda_max(normalized: &[Vec<(usize, f64)>], iterations: usize, tolerance: f64) -> f64 {
    let n = normalized.len();
    if n == 0 {
        return LAMBDA_MAX_BOUND;
    }

    let tolerance = tolerance.min(MAX_RESIDUAL);
    let mut x = seeded_unit_vector(n);
    for step in 0..iterations {
        // y = L·x
        let y: Vec<f64> = normalized
            .iter()
            .enumerate()
            .map(|(i, row)| x[i] - row.iter().map(|&(j, v)| v * x[j]).sum::<f64>())
            .collect();
        let theta: f64 = x.iter().zip(&y).map(|(a, b)| a * b).sum();
        let residual = y
            .iter()
            .zip(&x)
            .map(|(yi, xi)| (yi - theta * xi).powi(2))
            .sum::<f64>()
            .sqrt();

        if residual <= tolerance * theta.abs().max(1.0) {
            let upper = (theta + residual) * (1.0 + ESTIMATE_MARGIN);
            tracing::trace!(steps = step + 1, theta, residual, "λ_max estimate converged");
            return if upper > 0.0 { upper.min(LAMBDA_MAX_BOUND) } else { LAMBDA_MAX_BOUND };
        }

        let norm = l2(&y);
        if norm <= f64::MIN_POSITIVE {
            break;
        }
        x = y.into_iter().map(|v| v / norm).collect();
    }

    tracing::debug!(iterations, tolerance, "λ_max estimate did not converge, using the bound");
    LAMBDA_MAX_BOUND
}

fn seeded_unit_vector(n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(POWER_ITERATION_SEED);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let norm = l2(&x).max(f64::MIN_POSITIVE);
    x.into_iter().map(|v| v / norm).collect()
}

fn l2(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn path4() -> Graph {
        Graph::from_dense(
            array![
                [0.0, 1.0, 1.0, 0.0],
                [1.0, 0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
            ]
            .view(),
        )
        .unwrap()
    }

    fn triangle() -> Graph {
        Graph::from_dense(
            array![[0.0, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]].view(),
        )
        .unwrap()
    }

    #[test]
    fn two_node_graph_matches_closed_form() {
        let g = Graph::from_dense(array![[0.0, 3.0], [3.0, 0.0]].view()).unwrap();
        let lap = build_laplacian(&g, LambdaMax::Bound);
        // L = [[1,−1],[−1,1]] → L̃ = L − I = [[0,−1],[−1,0]]
        let dense = lap.to_dense();
        assert_abs_diff_eq!(dense, array![[0.0f32, -1.0], [-1.0, 0.0]], epsilon = 1e-6);
        assert_eq!(lap.lambda_max(), 2.0);
    }

    #[test]
    fn isolated_nodes_give_zero_operator_with_bound() {
        let lap = build_laplacian(&Graph::empty(3), LambdaMax::Bound);
        assert_eq!(lap.nnz(), 0);
        let mut out = Array1::zeros(3);
        lap.apply(array![1.0f32, 2.0, 3.0].view(), out.view_mut());
        assert_eq!(out, array![0.0f32, 0.0, 0.0]);
    }

    #[test]
    fn isolated_nodes_estimate_lambda_one() {
        let strategy = LambdaMax::Estimate { iterations: 50, tolerance: 1e-12 };
        let lap = build_laplacian(&Graph::empty(3), strategy);
        assert_abs_diff_eq!(lap.lambda_max(), 1.0 + ESTIMATE_MARGIN, epsilon = 1e-9);
        assert!(lap.spectral_radius(50) <= 1.0);
    }

    #[test]
    fn triangle_estimate_is_close_to_three_halves() {
        // Normalized Laplacian of K3 has eigenvalues {0, 1.5, 1.5}.
        let g = triangle();
        let strategy = LambdaMax::Estimate { iterations: 200, tolerance: 1e-12 };
        let lap = build_laplacian(&g, strategy);
        assert_abs_diff_eq!(lap.lambda_max(), 1.5 * (1.0 + ESTIMATE_MARGIN), epsilon = 1e-6);
    }

    fn path(n: usize) -> Graph {
        let edges: Vec<(usize, usize, f64)> = (0..n - 1)
            .flat_map(|i| [(i, i + 1, 1.0), (i + 1, i, 1.0)])
            .collect();
        Graph::from_triplets(n, &edges).unwrap()
    }

    #[test]
    fn early_stopped_estimate_keeps_radius_within_one() {
        // Paths have a dense spectrum just below λ_max = 2, where a plain
        // Rayleigh quotient stops several percent short.
        for n in [8usize, 16, 32, 64] {
            for (iterations, tolerance) in [(100, 1e-3), (20, 1e-6), (500, 1e-9), (5, 0.5)] {
                let lap = build_laplacian(&path(n), LambdaMax::Estimate { iterations, tolerance });
                let rho = lap.spectral_radius(3000);
                assert!(
                    rho <= 1.0 + 1e-4,
                    "n={n} iterations={iterations} tolerance={tolerance}: radius {rho}"
                );
            }
        }
    }

    #[test]
    fn unconverged_estimate_falls_back_to_bound() {
        let lap = build_laplacian(&path(32), LambdaMax::Estimate { iterations: 3, tolerance: 1e-9 });
        assert_eq!(lap.lambda_max(), LAMBDA_MAX_BOUND);
    }

    #[test]
    fn rescaled_radius_is_at_most_one() {
        let lap = build_laplacian(&path4(), LambdaMax::Bound);
        let rho = lap.spectral_radius(200);
        assert!(rho <= 1.0 + 1e-5, "spectral radius {rho} exceeds 1");
        assert!(rho > 0.5, "power iteration should find a dominant eigenvalue, got {rho}");
    }

    #[test]
    fn apply_signal_matches_dense_product() {
        let lap = build_laplacian(&path4(), LambdaMax::Bound);
        let dense = lap.to_dense();
        let x = Array3::from_shape_fn((2, 3, 4), |(b, c, i)| (b * 12 + c * 4 + i) as f32 * 0.1);
        let y = lap.apply_signal(x.view());
        for b in 0..2 {
            for c in 0..3 {
                let expected: Array1<f32> = dense.dot(&x.slice(ndarray::s![b, c, ..]));
                assert_abs_diff_eq!(y.slice(ndarray::s![b, c, ..]), expected.view(), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn rows_keep_sorted_columns_with_diagonal() {
        let strategy = LambdaMax::Estimate { iterations: 100, tolerance: 1e-12 };
        // K3 is not bipartite, so λ_max < 2 and the diagonal is non-zero.
        let lap = build_laplacian(&triangle(), strategy);
        for i in 0..lap.nodes() {
            let cols = &lap.col_idx[lap.offsets[i]..lap.offsets[i + 1]];
            assert!(cols.windows(2).all(|w| w[0] < w[1]), "row {i} not sorted: {cols:?}");
            assert!(cols.contains(&i), "row {i} lacks its diagonal");
        }
    }

    #[test]
    fn from_adjacency_validates() {
        let bad = array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
        assert!(ScaledLaplacian::from_adjacency(bad.view(), LambdaMax::Bound).is_err());
    }

    #[test]
    fn lambda_strategy_reads_from_json() {
        let s: LambdaMax =
            serde_json::from_str(r#"{"kind":"estimate","iterations":100,"tolerance":1e-9}"#).unwrap();
        assert_eq!(s, LambdaMax::Estimate { iterations: 100, tolerance: 1e-9 });
        let b: LambdaMax = serde_json::from_str(r#"{"kind":"bound"}"#).unwrap();
        assert_eq!(b, LambdaMax::Bound);
    }
}
