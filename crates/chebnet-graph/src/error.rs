use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    /// Malformed adjacency: non-square, negative or non-finite weight,
    /// self-loop, or asymmetry beyond tolerance.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Invalid coarsening / combination parameters.
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
