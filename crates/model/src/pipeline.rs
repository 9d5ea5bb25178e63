use serde::{Deserialize, Serialize};

/// Pipeline definition as loaded from a JSON spec file. Purely declarative;
/// operator names are resolved against the registry when the execution plan
/// is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub source: SourceSpec,
    pub stages: Vec<StageSpec>,
    pub accept_sink: SinkSpec,
    pub rejection_sink: SinkSpec,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Directory receiving the three metric tiers; metrics persistence is
    /// skipped when absent.
    #[serde(default)]
    pub metrics_root: Option<String>,
    #[serde(default)]
    pub retry: Option<RetrySpec>,
    /// Operator faults tolerated before the run fails. Default is fail-fast
    /// on the first fault.
    #[serde(default)]
    pub max_operator_faults: u64,
    /// Wall-clock budget for the whole run. Timeouts are per run, not per
    /// operator; expiry cancels dispatch between batches.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_batch_size() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub operators: Vec<OperatorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSpec {
    /// Registry name of the operator.
    pub op: String,
    /// Operator-specific parameters, passed to the constructor unparsed.
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: String,
    #[serde(default)]
    pub format: SourceFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    pub path: String,
    #[serde(default)]
    pub format: SinkFormat,
    /// Column the sink partitions on (directory per distinct value).
    #[serde(default)]
    pub partition_by: Option<String>,
    /// Dotted path extracting the partition key from a nested field, e.g.
    /// `_rejection_details.operator`. Takes precedence over direct column
    /// access when set.
    #[serde(default)]
    pub partition_key_extractor: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Parquet,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySpec {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_spec() {
        let raw = serde_json::json!({
            "name": "curation",
            "source": {"path": "input.jsonl"},
            "stages": [
                {"name": "quality", "operators": [
                    {"op": "threshold_filter", "params": {"field": "score", "min": 0.5}}
                ]}
            ],
            "accept_sink": {"path": "out/accepted"},
            "rejection_sink": {
                "path": "out/rejected",
                "partition_by": "operator",
                "partition_key_extractor": "_rejection_details.operator"
            }
        });

        let spec: PipelineSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.batch_size, 1024);
        assert_eq!(spec.max_in_flight, 4);
        assert_eq!(spec.max_operator_faults, 0);
        assert_eq!(spec.timeout_secs, None);
        assert_eq!(spec.stages.len(), 1);
        assert_eq!(spec.stages[0].operators[0].op, "threshold_filter");
        assert_eq!(spec.accept_sink.format, SinkFormat::Parquet);
        assert_eq!(
            spec.rejection_sink.partition_key_extractor.as_deref(),
            Some("_rejection_details.operator")
        );
    }
}
