use connectors::{error::SinkError, sink::DataWriter};
use engine_core::retry::{RetryDisposition, RetryError, RetryPolicy};
use model::records::record::Record;
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

fn classify_sink_error(err: &SinkError) -> RetryDisposition {
    if err.is_retryable() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

/// Retrying boundary in front of a sink. Transient write failures are
/// retried with backoff; exhausted or fatal failures bubble up so data loss
/// is never silent.
pub struct SinkWriter {
    writer: Arc<dyn DataWriter>,
    retry: RetryPolicy,
    label: &'static str,
}

impl SinkWriter {
    pub fn new(writer: Arc<dyn DataWriter>, retry: RetryPolicy, label: &'static str) -> Self {
        Self {
            writer,
            retry,
            label,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub async fn write(&self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        self.run_with_retry(|| self.writer.write(records)).await?;
        self.log_write(None, records.len(), start);
        Ok(())
    }

    pub async fn write_partition(&self, key: &str, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        self.run_with_retry(|| self.writer.write_partition(key, records))
            .await?;
        self.log_write(Some(key), records.len(), start);
        Ok(())
    }

    pub async fn close(&self) -> Result<(), SinkError> {
        self.writer.close().await
    }

    async fn run_with_retry<F, Fut>(&self, op: F) -> Result<(), SinkError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), SinkError>>,
    {
        match self.retry.run(op, classify_sink_error).await {
            Ok(()) => Ok(()),
            Err(RetryError::Fatal(e)) => {
                warn!(sink = self.label, error = %e, "Sink write failed fatally");
                Err(e)
            }
            Err(RetryError::AttemptsExceeded(e)) => {
                warn!(sink = self.label, error = %e, "Sink write retries exhausted");
                Err(e)
            }
        }
    }

    fn log_write(&self, partition: Option<&str>, records: usize, start: Instant) {
        let duration = start.elapsed();
        info!(
            sink = self.label,
            partition = partition.unwrap_or("-"),
            records,
            duration_ms = duration.as_millis(),
            "Batch written to sink"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::sink::MemoryWriter;
    use model::core::value::Value;
    use std::time::Duration;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::from_fields([("id", Value::Int(i as i64))]))
            .collect()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(0), Duration::from_millis(0))
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let writer = Arc::new(MemoryWriter::new());
        writer.fail_next_writes(2);

        let sink = SinkWriter::new(writer.clone(), fast_retry(), "accept");
        sink.write(&records(4)).await.unwrap();
        assert_eq!(writer.records().len(), 4);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
        let writer = Arc::new(MemoryWriter::new());
        writer.fail_next_writes(5);

        let sink = SinkWriter::new(writer.clone(), fast_retry(), "accept");
        let err = sink.write(&records(1)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(writer.records().is_empty());
    }

    #[tokio::test]
    async fn fatal_errors_skip_retry() {
        let writer = Arc::new(MemoryWriter::new());
        writer.close().await.unwrap();

        let sink = SinkWriter::new(writer, fast_retry(), "accept");
        let err = sink.write(&records(1)).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }
}
