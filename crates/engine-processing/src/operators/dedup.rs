use crate::operators::require_string_list;
use engine_core::{
    error::OperatorError,
    operator::{DedupeOutcome, Deduplicator, Operator},
};
use model::records::record::Record;
use std::collections::HashMap;

/// Exact-key deduplication within a batch. The detection key is the blake3
/// hash of the configured fields' canonical JSON, so any value type can key
/// a cluster. First-seen in batch order is kept; every later member of the
/// cluster is rejected with a reason naming the kept record's key. Each
/// batch is deduplicated independently; callers wanting a wider scope supply
/// a wider batch.
pub struct KeyDeduplicator {
    key_fields: Vec<String>,
}

impl KeyDeduplicator {
    pub fn new(key_fields: Vec<String>) -> Self {
        Self { key_fields }
    }

    fn detection_key(&self, record: &Record) -> (blake3::Hash, String) {
        let mut hasher = blake3::Hasher::new();
        let mut display = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let json = record
                .get(field)
                .map(|v| v.to_json())
                .unwrap_or(serde_json::Value::Null);
            let canonical = serde_json::to_string(&json).unwrap_or_default();
            hasher.update(canonical.as_bytes());
            hasher.update(b"\x1f");
            display.push(canonical);
        }
        (hasher.finalize(), display.join(","))
    }
}

impl Deduplicator for KeyDeduplicator {
    fn dedupe(&self, records: Vec<Record>) -> Result<DedupeOutcome, OperatorError> {
        let mut outcome = DedupeOutcome::default();
        let mut seen: HashMap<blake3::Hash, String> = HashMap::with_capacity(records.len());

        for record in records {
            let (key, display) = self.detection_key(&record);
            match seen.get(&key) {
                Some(kept_key) => {
                    outcome
                        .rejected
                        .push((record, format!("duplicate of key '{kept_key}'")));
                }
                None => {
                    seen.insert(key, display);
                    outcome.kept.push(record);
                }
            }
        }
        Ok(outcome)
    }
}

pub fn key_dedup(params: &serde_json::Value) -> Result<Operator, OperatorError> {
    let key_fields = require_string_list(params, "key_fields")?;
    Ok(Operator::deduplicator(
        "key_dedup",
        KeyDeduplicator::new(key_fields),
    ))
}
