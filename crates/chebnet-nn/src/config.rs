//! Model hyperparameters.
//!
//! Defaults reproduce the GC32-P4-GC64-P4 feature extractor: four binary
//! coarsening levels merged in pairs (4× pooling), order-25 filters.

use chebnet_graph::LambdaMax;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{NnError, Result};

pub const DEFAULT_COARSENING_LEVELS: usize = 4;
pub const DEFAULT_POOL_FACTOR: usize = 2;
pub const DEFAULT_ORDER: usize = 25;
pub const DEFAULT_SEED: u64 = 0x5eed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Binary coarsening levels computed from the input graph.
    pub coarsening_levels: usize,
    /// Binary levels merged into one pooling step (pool size `2^factor`).
    pub pool_factor: usize,
    /// Output channels per convolution stage.
    pub channels: Vec<usize>,
    /// Chebyshev order `K` of every filter.
    pub order: usize,
    pub use_bias: bool,
    pub initial_bias: f32,
    pub lambda_max: LambdaMax,
    /// Seed for parameter initialisation.
    pub seed: u64,
    pub device: Device,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            coarsening_levels: DEFAULT_COARSENING_LEVELS,
            pool_factor: DEFAULT_POOL_FACTOR,
            channels: vec![32, 64],
            order: DEFAULT_ORDER,
            use_bias: true,
            initial_bias: 0.0,
            lambda_max: LambdaMax::Bound,
            seed: DEFAULT_SEED,
            device: Device::Cpu,
        }
    }
}

impl ModelConfig {
    /// Parse JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Pooling steps available after merging.
    pub fn pooling_steps(&self) -> usize {
        self.coarsening_levels.checked_div(self.pool_factor).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(NnError::Configuration("order must be at least 1".into()));
        }
        if self.pool_factor == 0 {
            return Err(NnError::Configuration("pool_factor must be at least 1".into()));
        }
        if self.coarsening_levels % self.pool_factor != 0 {
            return Err(NnError::Configuration(format!(
                "{} coarsening levels cannot be merged in groups of {}",
                self.coarsening_levels, self.pool_factor
            )));
        }
        if self.channels.is_empty() {
            return Err(NnError::Configuration("at least one convolution stage is required".into()));
        }
        if self.channels.contains(&0) {
            return Err(NnError::Configuration("channel counts must be at least 1".into()));
        }
        if self.channels.len() > self.pooling_steps() {
            return Err(NnError::Configuration(format!(
                "{} stages requested, only {} pooling steps available",
                self.channels.len(),
                self.pooling_steps()
            )));
        }
        if !self.initial_bias.is_finite() {
            return Err(NnError::Configuration("initial_bias must be finite".into()));
        }
        Ok(())
    }
}
