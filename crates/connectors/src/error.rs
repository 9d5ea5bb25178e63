use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open source '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read from source: {0}")]
    Read(#[from] std::io::Error),

    #[error("Malformed record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record on line {line} is not a JSON object")]
    NotAnObject { line: usize },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write to sink: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to encode columnar batch: {0}")]
    Encode(String),

    #[error("Sink is closed")]
    Closed,
}

impl SinkError {
    /// I/O failures are worth retrying; encoding and lifecycle errors are
    /// deterministic and fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Io(_))
    }
}

#[derive(Error, Debug)]
pub enum MetricsStoreError {
    #[error("Failed to access metrics directory '{path}': {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metrics file: {0}")]
    Write(String),

    #[error("Failed to read metrics file '{path}': {reason}")]
    Read { path: String, reason: String },
}
