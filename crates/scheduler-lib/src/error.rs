//! Error taxonomy for the decision core

use thiserror::Error;

/// Failures reported by a value-function model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("state has no rows")]
    EmptyState,

    #[error("non-finite feature at row {row}, column {column}")]
    NonFiniteFeature { row: usize, column: usize },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("fit diverged to non-finite weights")]
    Diverged,

    #[error("action {action} outside prediction of width {width}")]
    ActionOutOfRange { action: usize, width: usize },
}

/// Errors surfaced by the agent and the scheduling decision protocol
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Replay memory holds fewer transitions than requested.
    /// Callers skip the learning step; this is not a failure.
    #[error("insufficient data: {available} transitions available, {requested} requested")]
    InsufficientData { available: usize, requested: usize },

    #[error("prediction failed: {0}")]
    Prediction(#[source] ModelError),

    #[error("fit failed: {0}")]
    Fit(#[source] ModelError),

    /// A phase ran without the state an earlier phase should have produced.
    #[error("missing cycle state: {0}")]
    MissingCycleState(String),

    #[error("node {0} is not part of this scheduling cycle")]
    UnknownNode(String),

    #[error("pod {pod} is missing required label {label:?}")]
    MissingServiceLabel { pod: String, label: &'static str },

    #[error("metrics query failed for node {node}: {message}")]
    MetricsQuery { node: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// True for conditions that only mean "skip this step"
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SchedulerError::InsufficientData { .. })
    }

    /// Stable label for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::InsufficientData { .. } => "insufficient_data",
            SchedulerError::Prediction(_) => "prediction",
            SchedulerError::Fit(_) => "fit",
            SchedulerError::MissingCycleState(_) => "missing_cycle_state",
            SchedulerError::UnknownNode(_) => "unknown_node",
            SchedulerError::MissingServiceLabel { .. } => "missing_service_label",
            SchedulerError::MetricsQuery { .. } => "metrics_query",
            SchedulerError::InvalidConfig(_) => "invalid_config",
        }
    }
}
