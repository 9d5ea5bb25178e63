use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, hash::Hash};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Boolean(bool),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    StringArray(Vec<String>),
    Null,
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Int(v) => v.hash(state),
            Uint(v) => v.hash(state),
            Float(v) => {
                // Hash the bits of the float to handle NaN and -0.0 correctly
                let bits = v.to_bits();
                bits.hash(state);
            }
            String(v) => v.hash(state),
            Boolean(v) => v.hash(state),
            Json(v) => {
                // Serialize JSON to a string for hashing
                let json_str = serde_json::to_string(v).unwrap_or_default();
                json_str.hash(state);
            }
            Bytes(v) => v.hash(state),
            Timestamp(v) => v.hash(state),
            StringArray(v) => v.hash(state),
            Null => {} // Nothing to hash for Null
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(v) => v.parse::<f64>().ok(),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Json(v) => v.as_f64(),
            Value::Bytes(_) => None,
            Value::Timestamp(_) => None,
            Value::StringArray(_) => None,
            Value::Null => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Uint(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Json(v) => v.as_str().map(|s| s.to_string()),
            Value::Bytes(_) => None,
            Value::Timestamp(v) => Some(v.to_rfc3339()),
            Value::StringArray(v) => Some(format!("{v:?}")),
            Value::Null => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Int(v) => Some(*v != 0),
            Value::Uint(v) => Some(*v != 0),
            Value::Float(v) => Some(*v != 0.0),
            Value::String(v) => match v.to_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            Value::Boolean(v) => Some(*v),
            Value::Json(v) => v.as_bool(),
            Value::Bytes(_) => None,
            Value::Timestamp(_) => None,
            Value::StringArray(_) => None,
            Value::Null => None,
        }
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Uint(a), Uint(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Uint(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Uint(b)) => a.partial_cmp(&(*b as f64)),
            (Int(a), Uint(b)) => u64::try_from(*a).ok().map(|a| a.cmp(b)),
            (Uint(a), Int(b)) => u64::try_from(*b).ok().map(|b| a.cmp(&b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn equal(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            Value::Int(_) => std::mem::size_of::<i64>(),
            Value::Uint(_) => std::mem::size_of::<u64>(),
            Value::Float(_) => std::mem::size_of::<f64>(),
            Value::String(s) => s.len(),
            Value::Boolean(_) => std::mem::size_of::<bool>(),
            Value::Json(v) => serde_json::to_string(v).map_or(0, |s| s.len()),
            Value::Bytes(b) => b.len(),
            Value::Timestamp(_) => std::mem::size_of::<DateTime<Utc>>(),
            Value::StringArray(arr) => arr.iter().map(|s| s.len()).sum(),
            Value::Null => 0,
        }
    }

    /// Lossless projection into a JSON value, used by the JSONL and Parquet
    /// sinks and by partition-key extraction.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Uint(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Boolean(v) => serde_json::Value::Bool(*v),
            Value::Json(v) => v.clone(),
            Value::Bytes(v) => serde_json::Value::String(hex_string(v)),
            Value::Timestamp(v) => serde_json::Value::String(v.to_rfc3339()),
            Value::StringArray(v) => {
                serde_json::Value::Array(v.iter().cloned().map(serde_json::Value::String).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }

    /// Inverse of [`Value::to_json`] for plain JSON input. Objects and
    /// mixed-type arrays are kept as `Value::Json` rather than flattened.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(|s| s.to_string()))
                    .collect();
                match strings {
                    Some(strings) => Value::StringArray(strings),
                    None => Value::Json(json.clone()),
                }
            }
            serde_json::Value::Object(_) => Value::Json(json.clone()),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::new(), |acc, byte: &u8| acc + &format!("{byte:02x}"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "0x{}", hex_string(v)),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::StringArray(v) => write!(f, "{}", v.join(",")),
            Value::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::String("0.25".into()).as_f64(), Some(0.25));
        assert_eq!(Value::Boolean(true).as_f64(), Some(1.0));
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn cross_type_compare() {
        assert_eq!(
            Value::Int(2).compare(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Uint(7).compare(&Value::Int(7)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Int(-1).compare(&Value::Uint(0)), None);
        assert_eq!(Value::String("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn json_round_trip() {
        let original = serde_json::json!({"nested": {"k": 1}});
        let value = Value::from_json(&original);
        assert!(matches!(value, Value::Json(_)));
        assert_eq!(value.to_json(), original);

        assert_eq!(Value::from_json(&serde_json::json!(42)), Value::Int(42));
        assert_eq!(
            Value::from_json(&serde_json::json!(["a", "b"])),
            Value::StringArray(vec!["a".into(), "b".into()])
        );
    }
}
