use connectors::error::{SinkError, SourceError};
use engine_core::error::{MetricsError, OperatorError, PlanError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Operator '{operator}' faulted in stage '{stage}': {source}")]
    OperatorFault {
        stage: String,
        operator: String,
        #[source]
        source: OperatorError,
    },
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    Config(#[from] PlanError),

    #[error("Failed to read from source: {0}")]
    Source(#[from] SourceError),

    #[error("Batch '{batch_id}' failed: {source}")]
    Stage {
        batch_id: String,
        #[source]
        source: StageError,
    },

    #[error("Failed to write batch '{batch_id}' to {sink} sink: {source}")]
    Sink {
        batch_id: String,
        sink: &'static str,
        #[source]
        source: SinkError,
    },

    #[error("Failed to close {sink} sink: {source}")]
    SinkClose {
        sink: &'static str,
        #[source]
        source: SinkError,
    },

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Failed to persist run metrics: {0}")]
    MetricsPersist(#[from] connectors::error::MetricsStoreError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run exceeded its wall-clock budget of {0}s")]
    TimedOut(u64),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
