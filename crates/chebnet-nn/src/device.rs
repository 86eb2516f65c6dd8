//! Device placement for buffers and components.
//!
//! Kernels in this crate execute on the host whatever the placement. A
//! [`Device`] is the placement tag a buffer carries: all operands of one call
//! must agree on it, which is the contract an accelerator backend enforces.
//! Moving a buffer retags it and never changes its values.

use std::fmt;

use ndarray::{Array, Array2, Dimension, Ix1, Ix3};
use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

// ─────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    /// Accelerator by ordinal.
    Accelerator(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(id) => write!(f, "accelerator:{id}"),
        }
    }
}

/// Components whose buffers can be moved between devices.
pub trait DeviceTransfer {
    fn device(&self) -> Device;

    /// Move every internal buffer to `device`. Logical values are unchanged.
    fn to_device(&mut self, device: Device);

    fn to_cpu(&mut self) {
        self.to_device(Device::Cpu);
    }
}

pub(crate) fn ensure_device(expected: Device, found: Device) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(NnError::DeviceMismatch { expected, found })
    }
}

// ─────────────────────────────────────────────
// DeviceArray
// ─────────────────────────────────────────────

/// An `f32` array together with the device it lives on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceArray<D: Dimension> {
    data: Array<f32, D>,
    device: Device,
}

/// Graph signal, `(batch, channels, nodes)`.
pub type Signal = DeviceArray<Ix3>;
/// Filter weights, `(out_channels, in_channels, K)`.
pub type Weights = DeviceArray<Ix3>;
/// Per-output-channel bias, `(out_channels,)`.
pub type Bias = DeviceArray<Ix1>;

impl<D: Dimension> DeviceArray<D> {
    /// Host-resident array.
    pub fn new(data: Array<f32, D>) -> Self {
        Self { data, device: Device::Cpu }
    }

    pub fn on(data: Array<f32, D>, device: Device) -> Self {
        Self { data, device }
    }

    #[inline]
    pub fn data(&self) -> &Array<f32, D> {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Array<f32, D> {
        &mut self.data
    }

    pub fn into_data(self) -> Array<f32, D> {
        self.data
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

impl DeviceArray<Ix3> {
    #[inline]
    pub fn batch(&self) -> usize {
        self.data.dim().0
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.data.dim().1
    }

    #[inline]
    pub fn nodes(&self) -> usize {
        self.data.dim().2
    }

    /// `(batch, channels · nodes)` features, channel-major, for a dense head.
    pub fn flatten(&self) -> Array2<f32> {
        let (batch, channels, nodes) = self.data.dim();
        Array2::from_shape_fn((batch, channels * nodes), |(b, j)| {
            self.data[[b, j / nodes, j % nodes]]
        })
    }
}

impl<D: Dimension> DeviceTransfer for DeviceArray<D> {
    fn device(&self) -> Device {
        self.device
    }

    fn to_device(&mut self, device: Device) {
        self.device = device;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn transfer_keeps_values() {
        let mut s = Signal::new(Array3::from_elem((1, 2, 3), 1.5));
        s.to_device(Device::Accelerator(0));
        assert_eq!(s.device(), Device::Accelerator(0));
        assert!(s.data().iter().all(|&v| v == 1.5));
        s.to_cpu();
        assert_eq!(s.device(), Device::Cpu);
    }

    #[test]
    fn ensure_device_reports_both_sides() {
        let err = ensure_device(Device::Cpu, Device::Accelerator(1)).unwrap_err();
        assert_eq!(err.to_string(), "device mismatch: expected cpu, found accelerator:1");
    }

    #[test]
    fn flatten_is_channel_major() {
        let s = Signal::new(array![[[1.0, 2.0], [3.0, 4.0]]]);
        assert_eq!(s.flatten(), array![[1.0f32, 2.0, 3.0, 4.0]]);
    }

    #[test]
    fn device_reads_from_json() {
        let d: Device = serde_json::from_str(r#"{"accelerator":2}"#).unwrap();
        assert_eq!(d, Device::Accelerator(2));
        let c: Device = serde_json::from_str(r#""cpu""#).unwrap();
        assert_eq!(c, Device::Cpu);
    }
}
