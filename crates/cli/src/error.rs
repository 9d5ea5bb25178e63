use engine_core::error::PlanError;
use engine_processing::error::ExecutorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the pipeline spec file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("Failed to parse the pipeline spec file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid pipeline configuration: {0}")]
    Plan(#[from] PlanError),

    #[error("Pipeline run failed: {0}")]
    Run(#[from] ExecutorError),

    #[error("Failed to load metrics: {0}")]
    Metrics(#[from] connectors::error::MetricsStoreError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
