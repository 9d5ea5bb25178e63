//! Record-to-Arrow encoding for the columnar sinks.
//!
//! Records are open mappings, so the schema is inferred per flush from the
//! union of field names. Numeric columns keep their width where every value
//! agrees; a mixed column degrades to Utf8 (JSON text for structured
//! values), which is also where nested objects such as rejection provenance
//! land.

use crate::error::SinkError;
use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder, UInt64Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use model::{core::value::Value, records::record::Record};
use std::{collections::BTreeSet, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int64,
    UInt64,
    Float64,
    Boolean,
    Utf8,
}

impl ColumnType {
    fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int64, UInt64) | (UInt64, Int64) => Float64,
            (Int64, Float64) | (Float64, Int64) => Float64,
            (UInt64, Float64) | (Float64, UInt64) => Float64,
            _ => Utf8,
        }
    }

    fn arrow_type(self) -> DataType {
        match self {
            ColumnType::Int64 => DataType::Int64,
            ColumnType::UInt64 => DataType::UInt64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }
}

fn column_type_of(value: &Value) -> ColumnType {
    match value {
        Value::Int(_) => ColumnType::Int64,
        Value::Uint(_) => ColumnType::UInt64,
        Value::Float(_) => ColumnType::Float64,
        Value::Boolean(_) => ColumnType::Boolean,
        _ => ColumnType::Utf8,
    }
}

fn utf8_value(json: &serde_json::Value) -> Option<String> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Encode a slice of records into one Arrow RecordBatch.
pub fn records_to_batch(records: &[Record]) -> Result<RecordBatch, SinkError> {
    // Union of field names across the flush, in stable (sorted) order. The
    // serialized view is used so rejection provenance becomes a column too.
    let jsons: Vec<serde_json::Value> = records.iter().map(|r| r.to_json()).collect();
    let mut names = BTreeSet::new();
    for json in &jsons {
        if let Some(object) = json.as_object() {
            for key in object.keys() {
                names.insert(key.clone());
            }
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len());
    for name in &names {
        let mut column_type: Option<ColumnType> = None;
        for record in records {
            if let Some(value) = record.get(name) {
                if matches!(value, Value::Null) {
                    continue;
                }
                let t = column_type_of(value);
                column_type = Some(match column_type {
                    Some(current) => current.widen(t),
                    None => t,
                });
            }
        }
        // Provenance and other non-field members only exist in the JSON view.
        let column_type = column_type.unwrap_or(ColumnType::Utf8);

        let column = build_column(column_type, name, &jsons)?;
        fields.push(Field::new(name, column_type.arrow_type(), true));
        columns.push(column);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| SinkError::Encode(e.to_string()))
}

fn build_column(
    column_type: ColumnType,
    name: &str,
    jsons: &[serde_json::Value],
) -> Result<ArrayRef, SinkError> {
    let column: ArrayRef = match column_type {
        ColumnType::Int64 => {
            let mut builder = Int64Builder::with_capacity(jsons.len());
            for json in jsons {
                builder.append_option(json.get(name).and_then(|v| v.as_i64()));
            }
            Arc::new(builder.finish())
        }
        ColumnType::UInt64 => {
            let mut builder = UInt64Builder::with_capacity(jsons.len());
            for json in jsons {
                builder.append_option(json.get(name).and_then(|v| v.as_u64()));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float64 => {
            let mut builder = Float64Builder::with_capacity(jsons.len());
            for json in jsons {
                builder.append_option(json.get(name).and_then(|v| v.as_f64()));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(jsons.len());
            for json in jsons {
                builder.append_option(json.get(name).and_then(|v| v.as_bool()));
            }
            Arc::new(builder.finish())
        }
        ColumnType::Utf8 => {
            let mut builder = StringBuilder::new();
            for json in jsons {
                builder.append_option(json.get(name).and_then(utf8_value));
            }
            Arc::new(builder.finish())
        }
    };
    Ok(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use model::records::rejection::{REJECTION_FIELD, RejectionDetails};

    #[test]
    fn infers_numeric_and_string_columns() {
        let records = vec![
            Record::from_fields([("id", Value::Int(1)), ("name", Value::String("a".into()))]),
            Record::from_fields([("id", Value::Int(2)), ("score", Value::Float(0.5))]),
        ];
        let batch = records_to_batch(&records).unwrap();

        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert_eq!(schema.field_with_name("id").unwrap().data_type(), &DataType::Int64);
        assert_eq!(
            schema.field_with_name("score").unwrap().data_type(),
            &DataType::Float64
        );

        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .unwrap();
        assert_eq!(ids.value(0), 1);
        let scores = batch
            .column_by_name("score")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .unwrap();
        assert!(scores.is_null(0));
        assert_eq!(scores.value(1), 0.5);
    }

    #[test]
    fn mixed_column_degrades_to_utf8() {
        let records = vec![
            Record::from_fields([("v", Value::Int(1))]),
            Record::from_fields([("v", Value::String("x".into()))]),
        ];
        let batch = records_to_batch(&records).unwrap();
        assert_eq!(
            batch.schema().field_with_name("v").unwrap().data_type(),
            &DataType::Utf8
        );
    }

    #[test]
    fn rejection_details_become_a_json_text_column() {
        let mut record = Record::from_fields([("id", Value::Int(9))]);
        record.reject(RejectionDetails::new("dedup", "stage_b", "duplicate"));
        let batch = records_to_batch(&[record]).unwrap();

        let details = batch
            .column_by_name(REJECTION_FIELD)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(details.value(0)).unwrap();
        assert_eq!(parsed["operator"], "dedup");
    }
}
