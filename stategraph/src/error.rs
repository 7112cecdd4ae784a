use thiserror::Error;

/// Errors produced by graph construction and execution.
///
/// Only fatal conditions live here. Recoverable failures (a degraded
/// fetch, a fallback template) are data in the caller's state type,
/// never errors.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node '{0}' has no outgoing edge")]
    NoRouteFrom(String),

    #[error("unknown routing key '{key}' leaving node '{node}'")]
    UnknownRoutingKey { node: String, key: String },

    #[error("step limit of {max_steps} reached at node '{node}'")]
    StepLimitExceeded { node: String, max_steps: usize },

    #[error("node execution failed: {0}")]
    NodeExecutionFailed(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
