//! `chebnet-nn` - Chebyshev spectral graph convolution and the GCNN feature
//! extractor built on it.
//!
//! Graph preprocessing (Laplacians, coarsening, pooling maps) lives in
//! `chebnet-graph`; this crate turns it into differentiable layers with an
//! explicit forward / backward contract and device placement.
//!
//! ## Crate structure
//!
//! | Module          | Responsibility                                              |
//! |-----------------|-------------------------------------------------------------|
//! | [`chebyshev`]   | [`ChebyshevFilter`]: `Σ_k W_k T_k(L̃) x` and its gradients  |
//! | [`pool`]        | [`GraphMaxPool`]: max over pooling-map rows                |
//! | [`conv`]        | [`GraphConvolution`]: filter + parameters, explicit build  |
//! | [`model`]       | [`GraphCnn`]: stacked conv → ReLU → pool stages            |
//! | [`config`]      | [`ModelConfig`]: serde hyperparameters                     |
//! | [`device`]      | [`Device`], [`DeviceTransfer`], [`DeviceArray`]             |
//!
//! ## Quick start
//!
//! ```rust
//! use chebnet_nn::{GraphCnn, ModelConfig, Signal};
//! use ndarray::{array, Array3};
//!
//! let a = array![
//!     [0.0, 1.0, 1.0, 0.0],
//!     [1.0, 0.0, 0.0, 1.0],
//!     [1.0, 0.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0, 0.0],
//! ];
//! let config = ModelConfig { order: 5, ..Default::default() };
//! let mut model = GraphCnn::from_dense(a.view(), &config)?;
//! model.build(1)?;
//!
//! let x = Signal::new(Array3::ones((8, 1, 4)));
//! let (y, tape) = model.forward(&x)?;
//! assert_eq!(y.shape(), &[8, 64, 1]);
//!
//! let grads = model.backward(&tape, &y)?;
//! assert_eq!(grads.input.shape(), x.shape());
//! # Ok::<(), chebnet_nn::NnError>(())
//! ```

pub mod chebyshev;
pub mod config;
pub mod conv;
pub mod device;
pub mod error;
pub mod model;
pub mod pool;

// ── Layers ────────────────────────────────────────────────────────────────────
pub use chebyshev::{ChebGradients, ChebTape, ChebyshevFilter};
pub use conv::GraphConvolution;
pub use pool::{GraphMaxPool, PoolTape};

// ── Model ─────────────────────────────────────────────────────────────────────
pub use config::ModelConfig;
pub use model::{GraphCnn, ModelGradients, ModelTape, Stage, StageGradients};

// ── Device ────────────────────────────────────────────────────────────────────
pub use device::{Bias, Device, DeviceArray, DeviceTransfer, Signal, Weights};

// ── Errors ────────────────────────────────────────────────────────────────────
pub use error::{NnError, Result};
