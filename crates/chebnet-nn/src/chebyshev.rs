//! Chebyshev spectral filtering on a fixed graph.
//!
//! ## Forward
//!
//! For a signal `x` of shape `(batch, in, N)` and weights `W` of shape
//! `(out, in, K)`:
//!
//! ```text
//! T_0 = x
//! T_1 = L̃ x
//! T_k = 2 L̃ T_{k−1} − T_{k−2}
//!
//! y[n, o, :] = Σ_c Σ_k W[o, c, k] · T_k[n, c, :] + b[o]
//! ```
//!
//! `L̃` acts on the node axis only. Cost is `K` sparse products plus `K` small
//! dense contractions per batch element; no eigendecomposition is needed.
//!
//! ## Backward
//!
//! `L̃` is symmetric, so every `T_k(L̃)` is too and
//!
//! ```text
//! grad_x[n, c, :] = Σ_k Σ_o W[o, c, k] · T_k(L̃) gy[n, o, :]
//! ```
//!
//! which is the same recurrence run on `gy`, contracted with `Wᵀ`.

use std::sync::Arc;

use chebnet_graph::ScaledLaplacian;
use ndarray::linalg::general_mat_mul;
use ndarray::{s, Array1, Array3, Array4, ArrayView3, Axis};

use crate::device::{ensure_device, Bias, Device, DeviceTransfer, Signal, Weights};
use crate::error::{NnError, Result};

// ─────────────────────────────────────────────
// Tape / gradients
// ─────────────────────────────────────────────

/// What [`ChebyshevFilter::backward`] needs from one forward call.
#[derive(Debug, Clone)]
pub struct ChebTape {
    /// `(K, batch, in, N)` Chebyshev basis of the input.
    basis: Array4<f32>,
    /// `(out, in, K)` weights used in the forward pass.
    weight: Array3<f32>,
    has_bias: bool,
}

impl ChebTape {
    #[inline]
    pub fn batch(&self) -> usize {
        self.basis.dim().1
    }

    #[inline]
    pub fn out_channels(&self) -> usize {
        self.weight.dim().0
    }
}

#[derive(Debug, Clone)]
pub struct ChebGradients {
    pub input: Signal,
    pub weight: Weights,
    pub bias: Option<Bias>,
}

// ─────────────────────────────────────────────
// ChebyshevFilter
// ─────────────────────────────────────────────

/// Order-`K` Chebyshev filter bound to one rescaled Laplacian.
///
/// Holds no per-call state: one filter can serve any number of concurrent
/// forward/backward calls.
#[derive(Debug, Clone)]
pub struct ChebyshevFilter {
    laplacian: Arc<ScaledLaplacian>,
    order: usize,
    device: Device,
}

impl ChebyshevFilter {
    pub fn new(laplacian: Arc<ScaledLaplacian>, order: usize) -> Result<Self> {
        if order == 0 {
            return Err(NnError::Configuration("Chebyshev order must be at least 1".into()));
        }
        Ok(Self { laplacian, order, device: Device::Cpu })
    }

    /// Number of polynomial terms `K`.
    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.laplacian.nodes()
    }

    pub fn laplacian(&self) -> &ScaledLaplacian {
        &self.laplacian
    }

    /// `(K, batch, channels, N)` stack of `T_k(L̃) x`.
    pub fn basis(&self, x: ArrayView3<'_, f32>) -> Array4<f32> {
        let (batch, channels, nodes) = x.dim();
        let mut t = Array4::zeros((self.order, batch, channels, nodes));
        t.index_axis_mut(Axis(0), 0).assign(&x);
        if self.order > 1 {
            let t1 = self.laplacian.apply_signal(x);
            t.index_axis_mut(Axis(0), 1).assign(&t1);
        }
        for k in 2..self.order {
            let mut next = self.laplacian.apply_signal(t.index_axis(Axis(0), k - 1));
            next.zip_mut_with(&t.index_axis(Axis(0), k - 2), |v, &prev| *v = 2.0 * *v - prev);
            t.index_axis_mut(Axis(0), k).assign(&next);
        }
        t
    }

    pub fn forward(
        &self,
        x: &Signal,
        weight: &Weights,
        bias: Option<&Bias>,
    ) -> Result<(Signal, ChebTape)> {
        ensure_device(self.device, x.device())?;
        ensure_device(self.device, weight.device())?;
        if let Some(b) = bias {
            ensure_device(self.device, b.device())?;
        }

        let (batch, in_channels, nodes) = x.data().dim();
        let (out_channels, w_in, w_order) = weight.data().dim();
        if nodes != self.nodes() {
            return Err(NnError::Shape(format!(
                "signal has {nodes} nodes, Laplacian has {}",
                self.nodes()
            )));
        }
        if w_order != self.order {
            return Err(NnError::Shape(format!(
                "weights carry {w_order} Chebyshev terms, filter order is {}",
                self.order
            )));
        }
        if w_in != in_channels {
            return Err(NnError::Shape(format!(
                "signal has {in_channels} channels, weights expect {w_in}"
            )));
        }
        if let Some(b) = bias {
            if b.data().len() != out_channels {
                return Err(NnError::Shape(format!(
                    "bias has {} entries, weights produce {out_channels} channels",
                    b.data().len()
                )));
            }
        }

        let w = weight.data();
        let basis = self.basis(x.data().view());
        let mut y = Array3::<f32>::zeros((batch, out_channels, nodes));

        for (n, mut yn) in y.outer_iter_mut().enumerate() {
            for k in 0..self.order {
                let wk = w.index_axis(Axis(2), k);
                let tk = basis.slice(s![k, n, .., ..]);
                general_mat_mul(1.0, &wk, &tk, 1.0, &mut yn);
            }
            if let Some(b) = bias {
                for (mut row, &bo) in yn.outer_iter_mut().zip(b.data().iter()) {
                    row += bo;
                }
            }
        }

        let tape = ChebTape { basis, weight: w.clone(), has_bias: bias.is_some() };
        Ok((Signal::on(y, self.device), tape))
    }

    pub fn backward(&self, tape: &ChebTape, grad_y: &Signal) -> Result<ChebGradients> {
        ensure_device(self.device, grad_y.device())?;

        let (order, batch, in_channels, nodes) = tape.basis.dim();
        if nodes != self.nodes() {
            return Err(NnError::Shape(format!(
                "tape covers {nodes} nodes, filter has {}",
                self.nodes()
            )));
        }
        if order != self.order || tape.weight.dim().2 != self.order {
            return Err(NnError::Shape(format!(
                "tape has order {order} (weights {}), filter has order {}",
                tape.weight.dim().2,
                self.order
            )));
        }

        let out_channels = tape.out_channels();
        let expected = (batch, out_channels, nodes);
        if grad_y.data().dim() != expected {
            return Err(NnError::Shape(format!(
                "output gradient has shape {:?}, forward produced {expected:?}",
                grad_y.shape()
            )));
        }

        let gy = grad_y.data();
        let g_basis = self.basis(gy.view());
        let mut grad_x = Array3::<f32>::zeros((batch, in_channels, nodes));
        let mut grad_w = Array3::<f32>::zeros((out_channels, in_channels, self.order));

        for n in 0..batch {
            let gy_n = gy.index_axis(Axis(0), n);
            let mut gx_n = grad_x.index_axis_mut(Axis(0), n);
            for k in 0..self.order {
                let wk = tape.weight.index_axis(Axis(2), k);
                general_mat_mul(1.0, &wk.t(), &g_basis.slice(s![k, n, .., ..]), 1.0, &mut gx_n);

                let tk = tape.basis.slice(s![k, n, .., ..]);
                let mut gw_k = grad_w.index_axis_mut(Axis(2), k);
                general_mat_mul(1.0, &gy_n, &tk.t(), 1.0, &mut gw_k);
            }
        }

        let grad_b = tape
            .has_bias
            .then(|| -> Array1<f32> { gy.sum_axis(Axis(2)).sum_axis(Axis(0)) });

        Ok(ChebGradients {
            input: Signal::on(grad_x, self.device),
            weight: Weights::on(grad_w, self.device),
            bias: grad_b.map(|b| Bias::on(b, self.device)),
        })
    }
}

impl DeviceTransfer for ChebyshevFilter {
    fn device(&self) -> Device {
        self.device
    }

    fn to_device(&mut self, device: Device) {
        tracing::debug!(from = %self.device, to = %device, nodes = self.nodes(), "Chebyshev filter moved");
        self.device = device;
    }
}
