use crate::error::SourceError;
use async_trait::async_trait;
use model::records::record::Record;
use std::path::{Path, PathBuf};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader, Lines},
};
use tracing::debug;

/// A lazy sequence of records. The engine treats the loader purely as an
/// iterable source; batching is layered on top by the caller.
#[async_trait]
pub trait DataLoader: Send {
    /// Next record, or `None` once the source is exhausted.
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError>;
}

/// Reads records from a file of JSON objects, one per line. Blank lines are
/// skipped; anything else that fails to parse is a hard error, surfaced with
/// its line number.
pub struct JsonlLoader {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
}

impl JsonlLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: None,
            line_no: 0,
        }
    }

    async fn ensure_open(&mut self) -> Result<(), SourceError> {
        if self.lines.is_none() {
            let file = File::open(&self.path)
                .await
                .map_err(|source| SourceError::Open {
                    path: self.path.display().to_string(),
                    source,
                })?;
            debug!(path = %self.path.display(), "Opened JSONL source");
            self.lines = Some(BufReader::new(file).lines());
        }
        Ok(())
    }
}

#[async_trait]
impl DataLoader for JsonlLoader {
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        self.ensure_open().await?;
        let lines = self.lines.as_mut().ok_or(SourceError::Open {
            path: self.path.display().to_string(),
            source: std::io::Error::other("source not open"),
        })?;

        while let Some(line) = lines.next_line().await? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let json: serde_json::Value =
                serde_json::from_str(&line).map_err(|source| SourceError::MalformedRecord {
                    line: self.line_no,
                    source,
                })?;
            return Record::from_json(&json)
                .map(Some)
                .ok_or(SourceError::NotAnObject { line: self.line_no });
        }
        Ok(None)
    }
}

/// In-memory loader for tests and programmatic runs.
pub struct MemoryLoader {
    records: std::vec::IntoIter<Record>,
}

impl MemoryLoader {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

#[async_trait]
impl DataLoader for MemoryLoader {
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        Ok(self.records.next())
    }
}

/// Open a loader for a path by format.
pub fn open_loader(path: &Path, format: model::pipeline::SourceFormat) -> Box<dyn DataLoader> {
    match format {
        model::pipeline::SourceFormat::Jsonl => Box::new(JsonlLoader::new(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::Value;
    use std::io::Write;

    #[tokio::test]
    async fn reads_jsonl_records_lazily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 1, "score": 0.9}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": 2, "score": 0.1}}"#).unwrap();

        let mut loader = JsonlLoader::new(file.path());
        let first = loader.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("id"), Some(&Value::Int(1)));
        let second = loader.next_record().await.unwrap().unwrap();
        assert_eq!(second.get("score"), Some(&Value::Float(0.1)));
        assert!(loader.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_reported_with_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 1}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let mut loader = JsonlLoader::new(file.path());
        loader.next_record().await.unwrap();
        let err = loader.next_record().await.unwrap_err();
        assert!(matches!(err, SourceError::MalformedRecord { line: 2, .. }));
    }

    #[tokio::test]
    async fn missing_file_fails_on_first_read() {
        let mut loader = JsonlLoader::new("/nonexistent/input.jsonl");
        let err = loader.next_record().await.unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }
}
