use chebnet_graph::GraphError;
use thiserror::Error;

use crate::device::Device;

#[derive(Debug, Error)]
pub enum NnError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Signal, weight, bias or Laplacian dimensions disagree.
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("device mismatch: expected {expected}, found {found}")]
    DeviceMismatch { expected: Device, found: Device },

    /// Invalid layer / model parameters or call order.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NnError>;
