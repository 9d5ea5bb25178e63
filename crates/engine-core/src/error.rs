use thiserror::Error;

/// An operator invocation failed unexpectedly. Surfaced by the stage driver
/// as a fatal error for the current batch; never silently swallowed.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Invalid operator parameters: {0}")]
    InvalidParams(String),

    #[error("Operator fault: {0}")]
    Fault(String),

    #[error("Operator fault: {source}")]
    Source {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Operator '{0}' is already registered")]
    Duplicate(String),

    #[error("Unknown operator '{0}'")]
    Unknown(String),

    #[error("Failed to construct operator '{name}': {source}")]
    Construct {
        name: String,
        #[source]
        source: OperatorError,
    },
}

/// Configuration problems detected while building the execution plan.
/// All of these fail fast, before a run enters `Running`.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Pipeline '{0}' defines no stages")]
    NoStages(String),

    #[error("Stage '{0}' defines no operators")]
    EmptyStage(String),

    #[error("Duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("Stage '{stage}': {source}")]
    Operator {
        stage: String,
        #[source]
        source: RegistryError,
    },

    #[error("Invalid batch size 0")]
    ZeroBatchSize,

    #[error("Invalid max_in_flight 0")]
    ZeroMaxInFlight,
}

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics collector was already finalized")]
    AlreadyFinalized,
}
