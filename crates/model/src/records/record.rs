use crate::{
    core::value::Value,
    records::rejection::{REJECTION_FIELD, RejectionDetails},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single record flowing through the pipeline: an open mapping from field
/// name to value. The engine imposes no schema; operators read and write
/// whatever fields they know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    rejection: Option<RejectionDetails>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            rejection: None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Attach rejection provenance. First rejector wins: if the record
    /// already carries details, the call is a no-op and returns false.
    pub fn reject(&mut self, details: RejectionDetails) -> bool {
        if self.rejection.is_some() {
            return false;
        }
        self.rejection = Some(details);
        true
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    pub fn rejection(&self) -> Option<&RejectionDetails> {
        self.rejection.as_ref()
    }

    pub fn size_bytes(&self) -> usize {
        self.fields
            .iter()
            .map(|(k, v)| k.len() + v.size_bytes())
            .sum()
    }

    /// Serialize to a JSON object. Rejection provenance, when present, is
    /// embedded under `_rejection_details` so downstream sinks can partition
    /// on it without knowing the Record type.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + 1);
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        if let Some(details) = &self.rejection {
            map.insert(
                REJECTION_FIELD.to_string(),
                serde_json::json!({
                    "operator": details.operator,
                    "stage": details.stage,
                    "reason": details.reason,
                }),
            );
        }
        serde_json::Value::Object(map)
    }

    /// Build a record from a JSON object. A `_rejection_details` member is
    /// lifted back into provenance; anything else becomes a field.
    pub fn from_json(json: &serde_json::Value) -> Option<Record> {
        let object = json.as_object()?;
        let mut record = Record::new();
        for (name, value) in object {
            if name == REJECTION_FIELD {
                if let Ok(details) = serde_json::from_value(value.clone()) {
                    record.rejection = Some(details);
                }
                continue;
            }
            record.set(name.clone(), Value::from_json(value));
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::from_fields([
            ("id", Value::Int(7)),
            ("score", Value::Float(0.9)),
            ("name", Value::String("alpha".into())),
        ])
    }

    #[test]
    fn first_rejector_wins() {
        let mut record = sample();
        assert!(record.reject(RejectionDetails::new("f1", "stage_a", "low score")));
        assert!(!record.reject(RejectionDetails::new("f2", "stage_b", "other")));

        let details = record.rejection().unwrap();
        assert_eq!(details.operator, "f1");
        assert_eq!(details.stage, "stage_a");
    }

    #[test]
    fn json_embeds_rejection_details() {
        let mut record = sample();
        record.reject(RejectionDetails::new("dedup", "stage_b", "duplicate"));

        let json = record.to_json();
        assert_eq!(json["id"], serde_json::json!(7));
        assert_eq!(json[REJECTION_FIELD]["operator"], "dedup");

        let restored = Record::from_json(&json).unwrap();
        assert!(restored.is_rejected());
        assert_eq!(restored.rejection().unwrap().operator, "dedup");
        assert_eq!(restored.get("name"), Some(&Value::String("alpha".into())));
    }

    #[test]
    fn accepted_record_has_no_rejection_member() {
        let json = sample().to_json();
        assert!(json.get(REJECTION_FIELD).is_none());
    }
}
