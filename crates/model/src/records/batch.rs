use crate::records::record::Record;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// An ordered group of records processed together. Batch boundaries are an
/// execution-granularity concern; operator semantics must not depend on how
/// the input stream was split.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub records: Vec<Record>,
    pub manifest: Manifest,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub record_count: usize,
    pub checksum_xxh3: u64, // rolling checksum over canonical record JSON
}

pub fn manifest_for(records: &[Record]) -> Manifest {
    let mut h: u64 = 0;
    for record in records {
        let bytes = serde_json::to_vec(&record.to_json()).unwrap_or_default();
        h = xxh3_64_with_seed(&bytes, h);
    }
    Manifest {
        record_count: records.len(),
        checksum_xxh3: h,
    }
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        let manifest = manifest_for(&records);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            records,
            manifest,
            ts: chrono::Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.records.iter().map(|r| r.size_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    fn record(id: i64) -> Record {
        Record::from_fields([("id", Value::Int(id))])
    }

    #[test]
    fn manifest_tracks_count_and_content() {
        let a = manifest_for(&[record(1), record(2)]);
        let b = manifest_for(&[record(1), record(2)]);
        let c = manifest_for(&[record(2), record(1)]);

        assert_eq!(a.record_count, 2);
        assert_eq!(a.checksum_xxh3, b.checksum_xxh3);
        // Rolling hash is order-sensitive.
        assert_ne!(a.checksum_xxh3, c.checksum_xxh3);
    }

    #[test]
    fn batches_get_unique_ids() {
        let a = Batch::new(vec![record(1)]);
        let b = Batch::new(vec![record(1)]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.manifest.checksum_xxh3, b.manifest.checksum_xxh3);
    }
}
