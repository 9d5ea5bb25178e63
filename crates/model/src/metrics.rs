use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per (run, stage, operator) observation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorMetric {
    pub run_id: String,
    pub stage_name: String,
    pub operator_name: String,
    pub input_records: u64,
    pub output_records: u64,
    pub min_latency: f64,
    pub p50_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    pub max_latency: f64,
    pub avg_latency: f64,
    /// Records processed per second of operator wall time.
    pub throughput: f64,
    pub recorded_at: DateTime<Utc>,
}

/// One row per (run, stage). Input/output totals are derivable from the
/// operator rows of the same stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetric {
    pub run_id: String,
    pub stage_name: String,
    pub avg_throughput: f64,
    pub recorded_at: DateTime<Utc>,
}

/// One row per pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetric {
    pub run_id: String,
    pub pipeline_name: String,
    pub total_input_records: u64,
    pub total_output_records: u64,
    /// `100 * output / input`, 0.0 when the run saw no input.
    pub overall_pass_rate: f64,
    pub duration_secs: f64,
    pub avg_throughput: f64,
    pub num_stages: u64,
    pub total_errors: u64,
    pub recorded_at: DateTime<Utc>,
}

impl RunMetric {
    pub fn pass_rate(total_input: u64, total_output: u64) -> f64 {
        if total_input == 0 {
            0.0
        } else {
            100.0 * total_output as f64 / total_input as f64
        }
    }
}
