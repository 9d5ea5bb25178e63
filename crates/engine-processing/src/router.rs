//! Partition-key extraction and grouping for the rejection path.
//!
//! Key extraction is a pure, total function: any missing or unresolvable
//! path lands in the `"unknown"` partition and never fails a batch. Keys are
//! sanitized to a filesystem-safe alphabet before they reach the sink; the
//! sanitization is idempotent and best-effort (distinct raw keys may
//! collapse to the same sanitized key).

use model::records::record::Record;
use tracing::debug;

pub const UNKNOWN_PARTITION: &str = "unknown";

/// Groups rejected records by the partition key configured for the
/// rejection sink, typically the rejecting operator's name reached through
/// `_rejection_details.operator`.
pub struct RejectionRouter {
    partition_by: Option<String>,
    key_extractor: Option<String>,
}

impl RejectionRouter {
    pub fn new(partition_by: Option<String>, key_extractor: Option<String>) -> Self {
        Self {
            partition_by,
            key_extractor,
        }
    }

    pub fn from_sink_spec(spec: &model::pipeline::SinkSpec) -> Self {
        Self::new(
            spec.partition_by.clone(),
            spec.partition_key_extractor.clone(),
        )
    }

    pub fn is_partitioned(&self) -> bool {
        self.partition_by.is_some() || self.key_extractor.is_some()
    }

    /// Group records by sanitized partition key, preserving first-seen group
    /// order and record order within each group.
    pub fn route(&self, records: Vec<Record>) -> Vec<(String, Vec<Record>)> {
        let mut groups: Vec<(String, Vec<Record>)> = Vec::new();
        for record in records {
            let key = self.partition_key(&record);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(record),
                None => groups.push((key, vec![record])),
            }
        }
        groups
    }

    fn partition_key(&self, record: &Record) -> String {
        let raw = extract_partition_key(
            record,
            self.partition_by.as_deref(),
            self.key_extractor.as_deref(),
        );
        let key = sanitize_partition_key(&raw);
        if key == UNKNOWN_PARTITION {
            debug!("Partition key unresolved, routing to 'unknown'");
        }
        key
    }
}

/// Extract the raw partition key from a record. The nested extractor takes
/// precedence; otherwise the partition column is read directly. Missing
/// values resolve to `"unknown"`.
pub fn extract_partition_key(
    record: &Record,
    partition_by: Option<&str>,
    key_extractor: Option<&str>,
) -> String {
    if let Some(path) = key_extractor {
        return walk_path(&record.to_json(), path)
            .and_then(leaf_to_string)
            .unwrap_or_else(|| UNKNOWN_PARTITION.to_string());
    }

    match partition_by {
        Some(column) => record
            .get(column)
            .and_then(|v| v.as_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_PARTITION.to_string()),
        None => "default".to_string(),
    }
}

/// Walk a dotted path through a JSON value. Where a segment's value is a
/// string, it is re-parsed as JSON before the walk continues, matching
/// records whose nested details were stored as serialized text.
fn walk_path(value: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(ref map) => map.get(segment)?.clone(),
            serde_json::Value::String(ref raw) => {
                let parsed: serde_json::Value = serde_json::from_str(raw).ok()?;
                parsed.get(segment)?.clone()
            }
            _ => return None,
        };
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

fn leaf_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::String(_) => None,
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Replace everything outside `[A-Za-z0-9_-]` with `_`. Idempotent.
pub fn sanitize_partition_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
