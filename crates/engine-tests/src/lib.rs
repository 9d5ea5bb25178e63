#![allow(dead_code)]

use model::{core::value::Value, records::record::Record};

pub mod engine;
pub mod integration;

/// A scored record with a dedup key, the shape most scenarios use.
pub fn scored_record(url: &str, score: f64) -> Record {
    Record::from_fields([
        ("url", Value::String(url.to_string())),
        ("score", Value::Float(score)),
    ])
}

/// Reference workload: `total` records, `low_score` of them scored under
/// 0.5, and `duplicates` extra copies of already-present URLs among the
/// passing ones.
pub fn reference_workload(total: usize, low_score: usize, duplicates: usize) -> Vec<Record> {
    assert!(low_score + duplicates <= total);

    let mut records = Vec::with_capacity(total);
    let unique_passing = total - low_score - duplicates;
    for i in 0..unique_passing {
        records.push(scored_record(&format!("https://example.com/{i}"), 0.9));
    }
    for i in 0..duplicates {
        // Duplicate the first unique URLs, one copy each.
        records.push(scored_record(&format!("https://example.com/{i}"), 0.8));
    }
    for i in 0..low_score {
        records.push(scored_record(&format!("https://example.com/low/{i}"), 0.2));
    }
    records
}
