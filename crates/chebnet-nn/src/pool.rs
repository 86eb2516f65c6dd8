//! Max pooling along a coarsening pooling map.

use std::sync::Arc;

use chebnet_graph::{PoolingMap, PAD};
use ndarray::{Array3, Axis, Zip};

use crate::device::{ensure_device, Device, DeviceTransfer, Signal};
use crate::error::{NnError, Result};

/// Winning fine node per `(batch, channel, coarse node)`; `PAD` where the row
/// had no real slot.
#[derive(Debug, Clone)]
pub struct PoolTape {
    argmax: Array3<usize>,
    fine_nodes: usize,
}

/// Downsamples `(batch, channels, fine)` to `(batch, channels, coarse)`.
///
/// `PAD` slots behave like a `−∞` fill and never win. A row without any real
/// slot (a padding node) produces 0.
#[derive(Debug, Clone)]
pub struct GraphMaxPool {
    map: Arc<PoolingMap>,
    device: Device,
}

impl GraphMaxPool {
    pub fn new(map: Arc<PoolingMap>) -> Self {
        Self { map, device: Device::Cpu }
    }

    pub fn map(&self) -> &PoolingMap {
        &self.map
    }

    pub fn forward(&self, x: &Signal) -> Result<(Signal, PoolTape)> {
        ensure_device(self.device, x.device())?;
        let (batch, channels, fine) = x.data().dim();
        if fine != self.map.fine_nodes() {
            return Err(NnError::Shape(format!(
                "signal has {fine} nodes, pooling map expects {}",
                self.map.fine_nodes()
            )));
        }

        let coarse = self.map.coarse_nodes();
        let mut y = Array3::<f32>::zeros((batch, channels, coarse));
        let mut argmax = Array3::from_elem((batch, channels, coarse), PAD);

        Zip::from(x.data().lanes(Axis(2)))
            .and(y.lanes_mut(Axis(2)))
            .and(argmax.lanes_mut(Axis(2)))
            .for_each(|src, mut dst, mut arg| {
                for (row, entry) in self.map.entries().enumerate() {
                    let mut best: Option<(usize, f32)> = None;
                    for &s in entry.iter().filter(|&&s| s != PAD) {
                        let v = src[s];
                        if best.map_or(true, |(_, b)| v > b) {
                            best = Some((s, v));
                        }
                    }
                    if let Some((s, v)) = best {
                        dst[row] = v;
                        arg[row] = s;
                    }
                }
            });

        Ok((Signal::on(y, self.device), PoolTape { argmax, fine_nodes: fine }))
    }

    /// Route each output gradient to the fine node that won the max.
    pub fn backward(&self, tape: &PoolTape, grad_y: &Signal) -> Result<Signal> {
        ensure_device(self.device, grad_y.device())?;
        if grad_y.data().dim() != tape.argmax.dim() {
            return Err(NnError::Shape(format!(
                "pooled gradient has shape {:?}, forward produced {:?}",
                grad_y.shape(),
                tape.argmax.shape()
            )));
        }

        let (batch, channels, _) = tape.argmax.dim();
        let mut grad_x = Array3::<f32>::zeros((batch, channels, tape.fine_nodes));
        Zip::from(grad_y.data().lanes(Axis(2)))
            .and(tape.argmax.lanes(Axis(2)))
            .and(grad_x.lanes_mut(Axis(2)))
            .for_each(|gy, arg, mut gx| {
                for (&g, &s) in gy.iter().zip(arg.iter()) {
                    if s != PAD {
                        gx[s] += g;
                    }
                }
            });

        Ok(Signal::on(grad_x, self.device))
    }
}

impl DeviceTransfer for GraphMaxPool {
    fn device(&self) -> Device {
        self.device
    }

    fn to_device(&mut self, device: Device) {
        tracing::debug!(from = %self.device, to = %device, coarse = self.map.coarse_nodes(), "pooling moved");
        self.device = device;
    }
}
