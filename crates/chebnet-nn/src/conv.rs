//! Graph convolution layer: a Chebyshev filter plus its parameters.
//!
//! Parameters are created by an explicit [`GraphConvolution::build`] once the
//! input channel count is known, or installed with
//! [`GraphConvolution::with_parameters`].

use std::sync::Arc;

use chebnet_graph::ScaledLaplacian;
use ndarray::{Array1, Array3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::chebyshev::{ChebGradients, ChebTape, ChebyshevFilter};
use crate::device::{Bias, Device, DeviceTransfer, Signal, Weights};
use crate::error::{NnError, Result};

#[derive(Debug, Clone)]
struct Parameters {
    weight: Weights,
    bias: Option<Bias>,
}

#[derive(Debug, Clone)]
pub struct GraphConvolution {
    filter: ChebyshevFilter,
    out_channels: usize,
    use_bias: bool,
    initial_bias: f32,
    params: Option<Parameters>,
}

impl GraphConvolution {
    pub fn new(
        laplacian: Arc<ScaledLaplacian>,
        out_channels: usize,
        order: usize,
        use_bias: bool,
        initial_bias: f32,
    ) -> Result<Self> {
        if out_channels == 0 {
            return Err(NnError::Configuration("output channel count must be at least 1".into()));
        }
        Ok(Self {
            filter: ChebyshevFilter::new(laplacian, order)?,
            out_channels,
            use_bias,
            initial_bias,
            params: None,
        })
    }

    /// Create weights for `in_channels` inputs.
    ///
    /// LeCun normal: `W ~ N(0, 1/(in_channels · K))`. The bias starts at
    /// `initial_bias`. Building again with the same channel count keeps the
    /// existing parameters.
    pub fn build<R: Rng + ?Sized>(&mut self, in_channels: usize, rng: &mut R) -> Result<()> {
        if in_channels == 0 {
            return Err(NnError::Configuration("input channel count must be at least 1".into()));
        }
        if let Some(current) = self.in_channels() {
            if current == in_channels {
                return Ok(());
            }
            return Err(NnError::Configuration(format!(
                "layer already built for {current} input channels, not {in_channels}"
            )));
        }

        let order = self.filter.order();
        let std = (1.0 / (in_channels * order) as f32).sqrt();
        let normal = Normal::new(0.0f32, std).map_err(|e| NnError::Configuration(e.to_string()))?;
        let weight = Array3::from_shape_fn((self.out_channels, in_channels, order), |_| {
            normal.sample(&mut *rng)
        });
        let bias = self
            .use_bias
            .then(|| Array1::from_elem(self.out_channels, self.initial_bias));

        let device = self.device();
        self.params = Some(Parameters {
            weight: Weights::on(weight, device),
            bias: bias.map(|b| Bias::on(b, device)),
        });
        debug!(
            in_channels,
            out_channels = self.out_channels,
            order,
            nodes = self.filter.nodes(),
            "graph convolution built"
        );
        Ok(())
    }

    /// Install explicit parameters. Shapes must match `(out, in, K)` and the
    /// layer's bias setting; the arrays are moved to the layer's device.
    pub fn with_parameters(&mut self, mut weight: Weights, mut bias: Option<Bias>) -> Result<()> {
        let (out, in_channels, order) = weight.data().dim();
        if out != self.out_channels || order != self.filter.order() || in_channels == 0 {
            return Err(NnError::Shape(format!(
                "weights have shape {:?}, layer needs ({}, in, {})",
                weight.shape(),
                self.out_channels,
                self.filter.order()
            )));
        }
        match (&bias, self.use_bias) {
            (Some(b), true) if b.data().len() != self.out_channels => {
                return Err(NnError::Shape(format!(
                    "bias has {} entries, layer has {} output channels",
                    b.data().len(),
                    self.out_channels
                )));
            }
            (Some(_), false) => {
                return Err(NnError::Configuration("layer was created without a bias".into()));
            }
            (None, true) => {
                return Err(NnError::Configuration("layer was created with a bias".into()));
            }
            _ => {}
        }

        let device = self.device();
        weight.to_device(device);
        if let Some(b) = bias.as_mut() {
            b.to_device(device);
        }
        self.params = Some(Parameters { weight, bias });
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.params.is_some()
    }

    pub fn in_channels(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.weight.data().dim().1)
    }

    #[inline]
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.filter.order()
    }

    pub fn filter(&self) -> &ChebyshevFilter {
        &self.filter
    }

    pub fn weight(&self) -> Option<&Weights> {
        self.params.as_ref().map(|p| &p.weight)
    }

    pub fn bias(&self) -> Option<&Bias> {
        self.params.as_ref().and_then(|p| p.bias.as_ref())
    }

    pub fn forward(&self, x: &Signal) -> Result<(Signal, ChebTape)> {
        let p = self.parameters()?;
        self.filter.forward(x, &p.weight, p.bias.as_ref())
    }

    pub fn backward(&self, tape: &ChebTape, grad_y: &Signal) -> Result<ChebGradients> {
        self.parameters()?;
        self.filter.backward(tape, grad_y)
    }

    fn parameters(&self) -> Result<&Parameters> {
        self.params
            .as_ref()
            .ok_or_else(|| NnError::Configuration("graph convolution used before build".into()))
    }
}

impl DeviceTransfer for GraphConvolution {
    fn device(&self) -> Device {
        self.filter.device()
    }

    fn to_device(&mut self, device: Device) {
        self.filter.to_device(device);
        if let Some(p) = self.params.as_mut() {
            p.weight.to_device(device);
            if let Some(b) = p.bias.as_mut() {
                b.to_device(device);
            }
        }
    }
}
