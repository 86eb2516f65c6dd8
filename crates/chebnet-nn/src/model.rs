//! Graph CNN feature extractor: `[conv → ReLU → max-pool]` per stage.
//!
//! ## Assembly
//!
//! ```text
//! adjacency ─ coarsen(levels) ─ combine(pool_factor) ─┬─ level 0 graph, map 0 ─ Stage 0
//!                                                     ├─ level 1 graph, map 1 ─ Stage 1
//!                                                     └─ …
//! ```
//!
//! Stage `i` convolves on level `i` of the merged hierarchy and pools onto
//! level `i + 1`. Levels beyond the configured stages are left unused.
//!
//! Level 0 is the input graph padded with isolated nodes up to a power of
//! two. Signals sized to the input graph are zero-padded on the way in and
//! their gradients cut back on the way out.

use std::sync::Arc;

use chebnet_graph::{build_laplacian, coarsen, combine, Graph};
use ndarray::{s, Array2, Array3, ArrayView2, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::chebyshev::{ChebGradients, ChebTape};
use crate::config::ModelConfig;
use crate::conv::GraphConvolution;
use crate::device::{Bias, Device, DeviceTransfer, Signal, Weights};
use crate::error::{NnError, Result};
use crate::pool::{GraphMaxPool, PoolTape};

#[derive(Debug, Clone)]
pub struct Stage {
    conv: GraphConvolution,
    pool: GraphMaxPool,
}

impl Stage {
    pub fn conv(&self) -> &GraphConvolution {
        &self.conv
    }

    pub fn conv_mut(&mut self) -> &mut GraphConvolution {
        &mut self.conv
    }

    pub fn pool(&self) -> &GraphMaxPool {
        &self.pool
    }
}

#[derive(Debug, Clone)]
struct StageTape {
    conv: ChebTape,
    /// Units with a positive pre-activation.
    active: Array3<bool>,
    pool: PoolTape,
}

/// Everything [`GraphCnn::backward`] needs from one forward call.
#[derive(Debug, Clone)]
pub struct ModelTape {
    stages: Vec<StageTape>,
    /// Node count of the signal handed to `forward`.
    input_nodes: usize,
}

#[derive(Debug, Clone)]
pub struct StageGradients {
    pub weight: Weights,
    pub bias: Option<Bias>,
}

#[derive(Debug, Clone)]
pub struct ModelGradients {
    pub input: Signal,
    /// One entry per stage, in forward order.
    pub stages: Vec<StageGradients>,
}

#[derive(Debug, Clone)]
pub struct GraphCnn {
    stages: Vec<Stage>,
    config: ModelConfig,
    graph_nodes: usize,
    node_counts: Vec<usize>,
}

impl GraphCnn {
    pub fn new(graph: &Graph, config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let hierarchy = coarsen(graph, config.coarsening_levels);
        let merged = combine(&hierarchy, config.pool_factor)?;
        if config.channels.len() > merged.depth() {
            return Err(NnError::Configuration(format!(
                "{} stages requested, hierarchy has {} pooling maps",
                config.channels.len(),
                merged.depth()
            )));
        }

        let node_counts = merged.node_counts();
        let (levels, maps) = merged.into_parts();
        let mut stages = Vec::with_capacity(config.channels.len());
        for ((&out_channels, level), map) in config.channels.iter().zip(&levels).zip(maps) {
            let laplacian = Arc::new(build_laplacian(&level.graph, config.lambda_max));
            let conv = GraphConvolution::new(
                laplacian,
                out_channels,
                config.order,
                config.use_bias,
                config.initial_bias,
            )?;
            stages.push(Stage { conv, pool: GraphMaxPool::new(Arc::new(map)) });
        }

        let mut model = Self { stages, config: config.clone(), graph_nodes: graph.node_count(), node_counts };
        model.to_device(config.device);
        info!(
            stages = model.stages.len(),
            input_nodes = model.input_nodes(),
            padded_nodes = model.node_counts[0],
            output_nodes = model.output_nodes(),
            order = config.order,
            "graph CNN assembled"
        );
        Ok(model)
    }

    /// Validate a dense adjacency, then assemble.
    pub fn from_dense(adjacency: ArrayView2<'_, f64>, config: &ModelConfig) -> Result<Self> {
        let graph = Graph::from_dense(adjacency)?;
        Self::new(&graph, config)
    }

    /// Create every stage's parameters, chaining channel counts from
    /// `in_channels`. Initialisation is seeded from the config.
    pub fn build(&mut self, in_channels: usize) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut channels = in_channels;
        for stage in &mut self.stages {
            stage.conv.build(channels, &mut rng)?;
            channels = stage.conv.out_channels();
        }
        debug!(in_channels, out_channels = channels, "graph CNN built");
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.stages.iter().all(|s| s.conv.is_built())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stages_mut(&mut self) -> &mut [Stage] {
        &mut self.stages
    }

    /// Node count of the input graph. Signals of this size are zero-padded
    /// to `node_counts()[0]`; signals already padded are accepted as is.
    pub fn input_nodes(&self) -> usize {
        self.graph_nodes
    }

    /// Node count of every merged level, finest first.
    pub fn node_counts(&self) -> &[usize] {
        &self.node_counts
    }

    /// Node count of the final pooled signal.
    pub fn output_nodes(&self) -> usize {
        self.node_counts[self.stages.len()]
    }

    pub fn output_channels(&self) -> usize {
        self.stages.last().map_or(0, |s| s.conv.out_channels())
    }

    /// Width of [`GraphCnn::features`] rows.
    pub fn feature_len(&self) -> usize {
        self.output_channels() * self.output_nodes()
    }

    /// Zero-pad a graph-sized signal to the finest level.
    fn pad_input(&self, x: &Signal) -> Result<Option<Signal>> {
        let (batch, channels, nodes) = x.data().dim();
        let padded = self.node_counts[0];
        if nodes == padded {
            return Ok(None);
        }
        if nodes != self.graph_nodes {
            return Err(NnError::Shape(format!(
                "signal has {nodes} nodes, model expects {} (or {padded} padded)",
                self.graph_nodes
            )));
        }
        let mut data = Array3::<f32>::zeros((batch, channels, padded));
        data.slice_mut(s![.., .., ..nodes]).assign(x.data());
        Ok(Some(Signal::on(data, x.device())))
    }

    pub fn forward(&self, x: &Signal) -> Result<(Signal, ModelTape)> {
        let input_nodes = x.data().dim().2;
        let padded = self.pad_input(x)?;
        let x = padded.as_ref().unwrap_or(x);

        let mut tapes = Vec::with_capacity(self.stages.len());
        let mut h: Option<Signal> = None;
        for stage in &self.stages {
            let input = h.as_ref().unwrap_or(x);
            let (pre, conv) = stage.conv.forward(input)?;
            let device = pre.device();
            let pre = pre.into_data();
            let active = pre.mapv(|v| v > 0.0);
            let activated = Signal::on(pre.mapv_into(|v| v.max(0.0)), device);
            let (pooled, pool) = stage.pool.forward(&activated)?;
            tapes.push(StageTape { conv, active, pool });
            h = Some(pooled);
        }
        let out = h.ok_or_else(|| NnError::Configuration("model has no stages".into()))?;
        Ok((out, ModelTape { stages: tapes, input_nodes }))
    }

    pub fn backward(&self, tape: &ModelTape, grad_y: &Signal) -> Result<ModelGradients> {
        if tape.stages.len() != self.stages.len() {
            return Err(NnError::Shape(format!(
                "tape has {} stages, model has {}",
                tape.stages.len(),
                self.stages.len()
            )));
        }

        let mut grad = grad_y.clone();
        let mut stage_grads = Vec::with_capacity(self.stages.len());
        for (stage, st) in self.stages.iter().zip(&tape.stages).rev() {
            let pooled = stage.pool.backward(&st.pool, &grad)?;
            let device = pooled.device();
            let mut g = pooled.into_data();
            Zip::from(&mut g).and(&st.active).for_each(|g, &on| {
                if !on {
                    *g = 0.0;
                }
            });
            let ChebGradients { input, weight, bias } =
                stage.conv.backward(&st.conv, &Signal::on(g, device))?;
            stage_grads.push(StageGradients { weight, bias });
            grad = input;
        }
        stage_grads.reverse();

        if grad.data().dim().2 != tape.input_nodes {
            let device = grad.device();
            let cut = grad.data().slice(s![.., .., ..tape.input_nodes]).to_owned();
            grad = Signal::on(cut, device);
        }

        Ok(ModelGradients { input: grad, stages: stage_grads })
    }

    /// Forward pass flattened to `(batch, channels · nodes)` for a dense
    /// classifier head.
    pub fn features(&self, x: &Signal) -> Result<Array2<f32>> {
        let (out, _) = self.forward(x)?;
        Ok(out.flatten())
    }
}

impl DeviceTransfer for GraphCnn {
    fn device(&self) -> Device {
        self.config.device
    }

    fn to_device(&mut self, device: Device) {
        for stage in &mut self.stages {
            stage.conv.to_device(device);
            stage.pool.to_device(device);
        }
        self.config.device = device;
        debug!(%device, "graph CNN moved");
    }
}
