use crate::{encode::records_to_batch, error::SinkError};
use async_trait::async_trait;
use chrono::Utc;
use model::records::record::Record;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, info};

/// Destination for processed records. Writes accept arbitrarily sized
/// batches and are at-least-once on retry; `close` releases resources for
/// writers that hold any.
#[async_trait]
pub trait DataWriter: Send + Sync {
    async fn write(&self, records: &[Record]) -> Result<(), SinkError>;

    /// Write a group of records under a partition key. Writers without
    /// partition support fall back to a plain write.
    async fn write_partition(&self, key: &str, records: &[Record]) -> Result<(), SinkError> {
        let _ = key;
        self.write(records).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Unique filename per flush so concurrent flushes never collide.
fn part_file_name(extension: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!("part_{timestamp}_{}.{extension}", &unique[..8])
}

fn partition_dir(root: &Path, partition_by: Option<&str>, key: &str) -> PathBuf {
    match partition_by {
        Some(column) => root.join(format!("{column}={key}")),
        None => root.join(key),
    }
}

/// Columnar sink: one snappy-compressed Parquet file per flush, partition
/// groups under `<partition_by>=<key>/` subdirectories.
pub struct ParquetWriter {
    root: PathBuf,
    partition_by: Option<String>,
}

impl ParquetWriter {
    pub fn new(root: impl Into<PathBuf>, partition_by: Option<String>) -> Self {
        Self {
            root: root.into(),
            partition_by,
        }
    }

    fn write_file(&self, dir: &Path, records: &[Record]) -> Result<(), SinkError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(part_file_name("parquet"));

        let batch = records_to_batch(records)?;
        let file = std::fs::File::create(&path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        writer
            .close()
            .map_err(|e| SinkError::Encode(e.to_string()))?;

        debug!(path = %path.display(), records = records.len(), "Wrote parquet part file");
        Ok(())
    }
}

#[async_trait]
impl DataWriter for ParquetWriter {
    async fn write(&self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        self.write_file(&self.root, records)
    }

    async fn write_partition(&self, key: &str, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let dir = partition_dir(&self.root, self.partition_by.as_deref(), key);
        self.write_file(&dir, records)
    }

    async fn close(&self) -> Result<(), SinkError> {
        info!(root = %self.root.display(), "Parquet sink closed");
        Ok(())
    }
}

/// Line-delimited JSON sink: one JSON object per line, a fresh part file per
/// flush, parent directories created on demand.
pub struct JsonlWriter {
    root: PathBuf,
    partition_by: Option<String>,
}

impl JsonlWriter {
    pub fn new(root: impl Into<PathBuf>, partition_by: Option<String>) -> Self {
        Self {
            root: root.into(),
            partition_by,
        }
    }

    fn write_file(&self, dir: &Path, records: &[Record]) -> Result<(), SinkError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(part_file_name("jsonl"));

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for record in records {
            let json = serde_json::to_string(&record.to_json())?;
            writeln!(file, "{}", json)?;
        }

        debug!(path = %path.display(), records = records.len(), "Wrote JSONL part file");
        Ok(())
    }
}

#[async_trait]
impl DataWriter for JsonlWriter {
    async fn write(&self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        self.write_file(&self.root, records)
    }

    async fn write_partition(&self, key: &str, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let dir = partition_dir(&self.root, self.partition_by.as_deref(), key);
        self.write_file(&dir, records)
    }
}

#[derive(Default)]
struct MemoryState {
    records: Vec<Record>,
    partitions: HashMap<String, Vec<Record>>,
    closed: bool,
    fail_writes: usize,
}

/// In-memory test double. Captures everything written and can be told to
/// fail the next N writes with a retryable I/O error.
#[derive(Default)]
pub struct MemoryWriter {
    state: Mutex<MemoryState>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.lock().fail_writes = count;
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    pub fn partition(&self, key: &str) -> Vec<Record> {
        self.lock().partitions.get(key).cloned().unwrap_or_default()
    }

    pub fn partition_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().partitions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_failure(state: &mut MemoryState) -> Result<(), SinkError> {
        if state.closed {
            return Err(SinkError::Closed);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(SinkError::Io(std::io::Error::other("injected write failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DataWriter for MemoryWriter {
    async fn write(&self, records: &[Record]) -> Result<(), SinkError> {
        let mut state = self.lock();
        Self::check_failure(&mut state)?;
        state.records.extend_from_slice(records);
        Ok(())
    }

    async fn write_partition(&self, key: &str, records: &[Record]) -> Result<(), SinkError> {
        let mut state = self.lock();
        Self::check_failure(&mut state)?;
        state
            .partitions
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Open a writer for a sink spec.
pub fn open_writer(spec: &model::pipeline::SinkSpec) -> Box<dyn DataWriter> {
    match spec.format {
        model::pipeline::SinkFormat::Parquet => Box::new(ParquetWriter::new(
            &spec.path,
            spec.partition_by.clone(),
        )),
        model::pipeline::SinkFormat::Jsonl => Box::new(JsonlWriter::new(
            &spec.path,
            spec.partition_by.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::Value;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::from_fields([("id", Value::Int(i as i64))]))
            .collect()
    }

    #[tokio::test]
    async fn parquet_partition_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ParquetWriter::new(dir.path(), Some("operator".to_string()));

        writer.write_partition("quality_filter", &records(3)).await.unwrap();
        writer.write_partition("quality_filter", &records(2)).await.unwrap();

        let partition = dir.path().join("operator=quality_filter");
        assert!(partition.is_dir());
        let files: Vec<_> = std::fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        // One unique file per flush.
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.starts_with("part_") && f.ends_with(".parquet")));
    }

    #[tokio::test]
    async fn jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlWriter::new(dir.path(), None);
        writer.write(&records(2)).await.unwrap();

        let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["id"], 0);
    }

    #[tokio::test]
    async fn empty_write_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ParquetWriter::new(dir.path().join("out"), None);
        writer.write(&[]).await.unwrap();
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn memory_writer_failure_injection() {
        let writer = MemoryWriter::new();
        writer.fail_next_writes(1);
        let err = writer.write(&records(1)).await.unwrap_err();
        assert!(err.is_retryable());
        writer.write(&records(1)).await.unwrap();
        assert_eq!(writer.records().len(), 1);
    }
}
