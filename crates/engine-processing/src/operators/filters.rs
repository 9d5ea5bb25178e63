use crate::operators::{require_f64, require_str, require_string_list};
use engine_core::{
    error::OperatorError,
    operator::{Filter, FilterDecision, Operator},
};
use model::{core::value::Value, records::record::Record};

/// Rejects records whose numeric field falls below a minimum. Records
/// missing the field, or carrying a non-numeric value, are rejected too:
/// a record that cannot be scored cannot pass a score gate.
pub struct ThresholdFilter {
    field: String,
    min: f64,
}

impl ThresholdFilter {
    pub fn new(field: impl Into<String>, min: f64) -> Self {
        Self {
            field: field.into(),
            min,
        }
    }
}

impl Filter for ThresholdFilter {
    fn evaluate(&self, record: &Record) -> Result<FilterDecision, OperatorError> {
        match record.get(&self.field).and_then(|v| v.as_f64()) {
            Some(value) if value >= self.min => Ok(FilterDecision::accept()),
            Some(value) => Ok(FilterDecision::reject(format!(
                "{} {value} below threshold {}",
                self.field, self.min
            ))),
            None => Ok(FilterDecision::reject(format!(
                "missing numeric field '{}'",
                self.field
            ))),
        }
    }
}

pub fn threshold_filter(params: &serde_json::Value) -> Result<Operator, OperatorError> {
    let field = require_str(params, "field")?;
    let min = require_f64(params, "min")?;
    Ok(Operator::filter(
        "threshold_filter",
        ThresholdFilter::new(field, min),
    ))
}

/// Rejects records missing any of the listed fields (null counts as
/// missing).
pub struct RequiredFieldsFilter {
    fields: Vec<String>,
}

impl RequiredFieldsFilter {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl Filter for RequiredFieldsFilter {
    fn evaluate(&self, record: &Record) -> Result<FilterDecision, OperatorError> {
        for field in &self.fields {
            let present = matches!(record.get(field), Some(v) if !matches!(v, Value::Null));
            if !present {
                return Ok(FilterDecision::reject(format!(
                    "missing required field '{field}'"
                )));
            }
        }
        Ok(FilterDecision::accept())
    }
}

pub fn required_fields(params: &serde_json::Value) -> Result<Operator, OperatorError> {
    let fields = require_string_list(params, "fields")?;
    Ok(Operator::filter(
        "required_fields",
        RequiredFieldsFilter::new(fields),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(score: Option<Value>) -> Record {
        let mut record = Record::from_fields([("id", Value::Int(1))]);
        if let Some(score) = score {
            record.set("score", score);
        }
        record
    }

    #[test]
    fn threshold_accepts_at_or_above_min() {
        let filter = ThresholdFilter::new("score", 0.5);
        assert!(filter
            .evaluate(&record(Some(Value::Float(0.5))))
            .unwrap()
            .accept);
        assert!(filter
            .evaluate(&record(Some(Value::Float(0.9))))
            .unwrap()
            .accept);

        let decision = filter.evaluate(&record(Some(Value::Float(0.2)))).unwrap();
        assert!(!decision.accept);
        assert!(decision.reason.unwrap().contains("below threshold"));
    }

    #[test]
    fn threshold_rejects_missing_or_non_numeric() {
        let filter = ThresholdFilter::new("score", 0.5);
        let decision = filter.evaluate(&record(None)).unwrap();
        assert!(!decision.accept);

        let decision = filter
            .evaluate(&record(Some(Value::StringArray(vec![]))))
            .unwrap();
        assert!(!decision.accept);
    }

    #[test]
    fn threshold_coerces_numeric_strings() {
        let filter = ThresholdFilter::new("score", 0.5);
        assert!(filter
            .evaluate(&record(Some(Value::String("0.75".into()))))
            .unwrap()
            .accept);
    }

    #[test]
    fn required_fields_rejects_null_and_missing() {
        let filter = RequiredFieldsFilter::new(vec!["id".into(), "score".into()]);

        assert!(filter
            .evaluate(&record(Some(Value::Float(0.1))))
            .unwrap()
            .accept);
        let decision = filter.evaluate(&record(None)).unwrap();
        assert_eq!(
            decision.reason.as_deref(),
            Some("missing required field 'score'")
        );
        let decision = filter.evaluate(&record(Some(Value::Null))).unwrap();
        assert!(!decision.accept);
    }
}
