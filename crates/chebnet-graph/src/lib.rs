//! `chebnet-graph` - graph side of a Chebyshev spectral graph CNN.
//!
//! Everything here runs once, when a model is assembled: validate the
//! adjacency, build one rescaled Laplacian per resolution, and coarsen the
//! graph into a hierarchy whose pooling maps downsample signals in lockstep.
//!
//! ## Crate structure
//!
//! | Module            | Responsibility                                          |
//! |-------------------|---------------------------------------------------------|
//! | [`graph`]         | [`Graph`]: validated symmetric CSR adjacency           |
//! | [`laplacian`]     | [`ScaledLaplacian`]: `L̃ = 2L/λ_max − I`                |
//! | [`coarsen`]       | Heavy-edge matching → [`Hierarchy`] of levels + maps    |
//! | [`pooling_map`]   | [`PoolingMap`]: coarse → fine slot table               |
//! | [`combine`]       | Merge `factor` binary levels into one pooling step      |
//!
//! ## Quick start
//!
//! ```rust
//! use chebnet_graph::{coarsen, combine, build_laplacian, Graph, LambdaMax};
//! use ndarray::array;
//!
//! let a = array![
//!     [0.0, 1.0, 1.0, 0.0],
//!     [1.0, 0.0, 0.0, 1.0],
//!     [1.0, 0.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0, 0.0],
//! ];
//! let graph = Graph::from_dense(a.view())?;
//!
//! let hierarchy = coarsen(&graph, 4);
//! let merged = combine(&hierarchy, 2)?;
//! assert_eq!(merged.maps()[0].width(), 4);
//!
//! let lap = build_laplacian(&merged.levels()[0].graph, LambdaMax::Bound);
//! assert!(lap.spectral_radius(100) <= 1.0 + 1e-5);
//! # Ok::<(), chebnet_graph::GraphError>(())
//! ```

pub mod coarsen;
pub mod combine;
pub mod error;
pub mod graph;
pub mod laplacian;
pub mod pooling_map;

// ── Graph ─────────────────────────────────────────────────────────────────────
pub use graph::{Graph, SYMMETRY_TOLERANCE};

// ── Laplacian ─────────────────────────────────────────────────────────────────
pub use laplacian::{build_laplacian, LambdaMax, ScaledLaplacian, ESTIMATE_MARGIN, LAMBDA_MAX_BOUND};

// ── Coarsening ────────────────────────────────────────────────────────────────
pub use coarsen::{coarsen, coarsen_dense, heavy_edge_matching, Hierarchy, Level};
pub use combine::combine;
pub use pooling_map::{PoolingMap, PAD};

// ── Errors ────────────────────────────────────────────────────────────────────
pub use error::{GraphError, Result};
