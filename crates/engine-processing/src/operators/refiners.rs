use crate::operators::require_string_list;
use engine_core::{
    error::OperatorError,
    operator::{Operator, Refiner},
};
use model::records::record::Record;
use std::collections::HashMap;

/// Keeps only the listed fields. A record with none of them left refines to
/// nothing, which rejects it.
pub struct ProjectRefiner {
    keep_fields: Vec<String>,
}

impl ProjectRefiner {
    pub fn new(keep_fields: Vec<String>) -> Self {
        Self { keep_fields }
    }
}

impl Refiner for ProjectRefiner {
    fn refine(&self, record: Record) -> Result<Option<Record>, OperatorError> {
        let projected = Record::from_fields(
            record
                .fields()
                .filter(|(name, _)| self.keep_fields.iter().any(|k| k == name))
                .map(|(name, value)| (name.to_string(), value.clone())),
        );
        if projected.is_empty() {
            Ok(None)
        } else {
            Ok(Some(projected))
        }
    }
}

pub fn project(params: &serde_json::Value) -> Result<Operator, OperatorError> {
    let keep_fields = require_string_list(params, "keep_fields")?;
    Ok(Operator::refiner("project", ProjectRefiner::new(keep_fields)))
}

/// Renames fields according to a source-to-target mapping; unmapped fields
/// pass through unchanged. A rename target that collides with an existing
/// field overwrites it.
pub struct RenameRefiner {
    mapping: HashMap<String, String>,
}

impl RenameRefiner {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }
}

impl Refiner for RenameRefiner {
    fn refine(&self, mut record: Record) -> Result<Option<Record>, OperatorError> {
        for (source, target) in &self.mapping {
            if let Some(value) = record.remove(source) {
                record.set(target.clone(), value);
            }
        }
        Ok(Some(record))
    }
}

pub fn rename_fields(params: &serde_json::Value) -> Result<Operator, OperatorError> {
    let mapping = params
        .get("mapping")
        .and_then(|v| v.as_object())
        .ok_or_else(|| OperatorError::InvalidParams("missing object parameter 'mapping'".into()))?;
    let mapping: HashMap<String, String> = mapping
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    if mapping.is_empty() {
        return Err(OperatorError::InvalidParams(
            "'mapping' must map field names to field names".into(),
        ));
    }
    Ok(Operator::refiner(
        "rename_fields",
        RenameRefiner::new(mapping),
    ))
}
