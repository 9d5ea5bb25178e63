//! Persistence for the three metric tiers.
//!
//! Layout under the metrics root:
//!
//! ```text
//! <root>/runs/part_<ts>_<id>.parquet
//! <root>/stages/part_<ts>_<id>.parquet
//! <root>/operators/part_<ts>_<id>.parquet
//! ```
//!
//! One file per run per tier, appended never rewritten; readers union every
//! file of a tier to reconstruct history. The tiers are schema-stable and
//! independently loadable, which is all the reporting surface relies on.

use crate::error::MetricsStoreError;
use arrow::array::{
    Float64Array, Float64Builder, StringArray, StringBuilder, UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use model::metrics::{OperatorMetric, RunMetric, StageMetric};
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

const RUNS_DIR: &str = "runs";
const STAGES_DIR: &str = "stages";
const OPERATORS_DIR: &str = "operators";

pub struct MetricsStore {
    root: PathBuf,
}

impl MetricsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist one run's metric tiers. Called once per run, after
    /// finalization; the written files are never mutated.
    pub fn persist(
        &self,
        run: &RunMetric,
        stages: &[StageMetric],
        operators: &[OperatorMetric],
    ) -> Result<(), MetricsStoreError> {
        self.write_tier(RUNS_DIR, run_batch(std::slice::from_ref(run))?)?;
        if !stages.is_empty() {
            self.write_tier(STAGES_DIR, stage_batch(stages)?)?;
        }
        if !operators.is_empty() {
            self.write_tier(OPERATORS_DIR, operator_batch(operators)?)?;
        }
        info!(
            run_id = %run.run_id,
            stages = stages.len(),
            operators = operators.len(),
            root = %self.root.display(),
            "Persisted run metrics"
        );
        Ok(())
    }

    pub fn load_runs(&self) -> Result<Vec<RunMetric>, MetricsStoreError> {
        self.load_tier(RUNS_DIR, decode_runs)
    }

    pub fn load_stages(&self) -> Result<Vec<StageMetric>, MetricsStoreError> {
        self.load_tier(STAGES_DIR, decode_stages)
    }

    pub fn load_operators(&self) -> Result<Vec<OperatorMetric>, MetricsStoreError> {
        self.load_tier(OPERATORS_DIR, decode_operators)
    }

    fn write_tier(&self, tier: &str, batch: RecordBatch) -> Result<(), MetricsStoreError> {
        let dir = self.root.join(tier);
        std::fs::create_dir_all(&dir).map_err(|source| MetricsStoreError::Directory {
            path: dir.display().to_string(),
            source,
        })?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("part_{timestamp}_{}.parquet", &unique[..8]));

        let file = std::fs::File::create(&path)
            .map_err(|e| MetricsStoreError::Write(e.to_string()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| MetricsStoreError::Write(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| MetricsStoreError::Write(e.to_string()))?;
        writer
            .close()
            .map_err(|e| MetricsStoreError::Write(e.to_string()))?;

        debug!(path = %path.display(), rows = batch.num_rows(), "Wrote metrics part file");
        Ok(())
    }

    fn load_tier<T, F>(&self, tier: &str, decode: F) -> Result<Vec<T>, MetricsStoreError>
    where
        F: Fn(&RecordBatch, &Path) -> Result<Vec<T>, MetricsStoreError>,
    {
        let dir = self.root.join(tier);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|source| MetricsStoreError::Directory {
                path: dir.display().to_string(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
            .collect();
        paths.sort();

        let mut rows = Vec::new();
        for path in paths {
            let file = std::fs::File::open(&path).map_err(|e| MetricsStoreError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)
                .and_then(|b| b.build())
                .map_err(|e| MetricsStoreError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            for batch in reader {
                let batch = batch.map_err(|e| MetricsStoreError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                rows.extend(decode(&batch, &path)?);
            }
        }
        Ok(rows)
    }
}

fn run_schema() -> Schema {
    Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("pipeline_name", DataType::Utf8, false),
        Field::new("total_input_records", DataType::UInt64, false),
        Field::new("total_output_records", DataType::UInt64, false),
        Field::new("overall_pass_rate", DataType::Float64, false),
        Field::new("duration_secs", DataType::Float64, false),
        Field::new("avg_throughput", DataType::Float64, false),
        Field::new("num_stages", DataType::UInt64, false),
        Field::new("total_errors", DataType::UInt64, false),
        Field::new("recorded_at", DataType::Utf8, false),
    ])
}

fn stage_schema() -> Schema {
    Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("stage_name", DataType::Utf8, false),
        Field::new("avg_throughput", DataType::Float64, false),
        Field::new("recorded_at", DataType::Utf8, false),
    ])
}

fn operator_schema() -> Schema {
    Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("stage_name", DataType::Utf8, false),
        Field::new("operator_name", DataType::Utf8, false),
        Field::new("input_records", DataType::UInt64, false),
        Field::new("output_records", DataType::UInt64, false),
        Field::new("min_latency", DataType::Float64, false),
        Field::new("p50_latency", DataType::Float64, false),
        Field::new("p95_latency", DataType::Float64, false),
        Field::new("p99_latency", DataType::Float64, false),
        Field::new("max_latency", DataType::Float64, false),
        Field::new("avg_latency", DataType::Float64, false),
        Field::new("throughput", DataType::Float64, false),
        Field::new("recorded_at", DataType::Utf8, false),
    ])
}

fn run_batch(runs: &[RunMetric]) -> Result<RecordBatch, MetricsStoreError> {
    let mut run_id = StringBuilder::new();
    let mut pipeline_name = StringBuilder::new();
    let mut total_input = UInt64Builder::with_capacity(runs.len());
    let mut total_output = UInt64Builder::with_capacity(runs.len());
    let mut pass_rate = Float64Builder::with_capacity(runs.len());
    let mut duration = Float64Builder::with_capacity(runs.len());
    let mut throughput = Float64Builder::with_capacity(runs.len());
    let mut num_stages = UInt64Builder::with_capacity(runs.len());
    let mut total_errors = UInt64Builder::with_capacity(runs.len());
    let mut recorded_at = StringBuilder::new();

    for run in runs {
        run_id.append_value(&run.run_id);
        pipeline_name.append_value(&run.pipeline_name);
        total_input.append_value(run.total_input_records);
        total_output.append_value(run.total_output_records);
        pass_rate.append_value(run.overall_pass_rate);
        duration.append_value(run.duration_secs);
        throughput.append_value(run.avg_throughput);
        num_stages.append_value(run.num_stages);
        total_errors.append_value(run.total_errors);
        recorded_at.append_value(run.recorded_at.to_rfc3339());
    }

    RecordBatch::try_new(
        Arc::new(run_schema()),
        vec![
            Arc::new(run_id.finish()),
            Arc::new(pipeline_name.finish()),
            Arc::new(total_input.finish()),
            Arc::new(total_output.finish()),
            Arc::new(pass_rate.finish()),
            Arc::new(duration.finish()),
            Arc::new(throughput.finish()),
            Arc::new(num_stages.finish()),
            Arc::new(total_errors.finish()),
            Arc::new(recorded_at.finish()),
        ],
    )
    .map_err(|e| MetricsStoreError::Write(e.to_string()))
}

fn stage_batch(stages: &[StageMetric]) -> Result<RecordBatch, MetricsStoreError> {
    let mut run_id = StringBuilder::new();
    let mut stage_name = StringBuilder::new();
    let mut throughput = Float64Builder::with_capacity(stages.len());
    let mut recorded_at = StringBuilder::new();

    for stage in stages {
        run_id.append_value(&stage.run_id);
        stage_name.append_value(&stage.stage_name);
        throughput.append_value(stage.avg_throughput);
        recorded_at.append_value(stage.recorded_at.to_rfc3339());
    }

    RecordBatch::try_new(
        Arc::new(stage_schema()),
        vec![
            Arc::new(run_id.finish()),
            Arc::new(stage_name.finish()),
            Arc::new(throughput.finish()),
            Arc::new(recorded_at.finish()),
        ],
    )
    .map_err(|e| MetricsStoreError::Write(e.to_string()))
}

fn operator_batch(operators: &[OperatorMetric]) -> Result<RecordBatch, MetricsStoreError> {
    let mut run_id = StringBuilder::new();
    let mut stage_name = StringBuilder::new();
    let mut operator_name = StringBuilder::new();
    let mut input_records = UInt64Builder::with_capacity(operators.len());
    let mut output_records = UInt64Builder::with_capacity(operators.len());
    let mut min_latency = Float64Builder::with_capacity(operators.len());
    let mut p50_latency = Float64Builder::with_capacity(operators.len());
    let mut p95_latency = Float64Builder::with_capacity(operators.len());
    let mut p99_latency = Float64Builder::with_capacity(operators.len());
    let mut max_latency = Float64Builder::with_capacity(operators.len());
    let mut avg_latency = Float64Builder::with_capacity(operators.len());
    let mut throughput = Float64Builder::with_capacity(operators.len());
    let mut recorded_at = StringBuilder::new();

    for op in operators {
        run_id.append_value(&op.run_id);
        stage_name.append_value(&op.stage_name);
        operator_name.append_value(&op.operator_name);
        input_records.append_value(op.input_records);
        output_records.append_value(op.output_records);
        min_latency.append_value(op.min_latency);
        p50_latency.append_value(op.p50_latency);
        p95_latency.append_value(op.p95_latency);
        p99_latency.append_value(op.p99_latency);
        max_latency.append_value(op.max_latency);
        avg_latency.append_value(op.avg_latency);
        throughput.append_value(op.throughput);
        recorded_at.append_value(op.recorded_at.to_rfc3339());
    }

    RecordBatch::try_new(
        Arc::new(operator_schema()),
        vec![
            Arc::new(run_id.finish()),
            Arc::new(stage_name.finish()),
            Arc::new(operator_name.finish()),
            Arc::new(input_records.finish()),
            Arc::new(output_records.finish()),
            Arc::new(min_latency.finish()),
            Arc::new(p50_latency.finish()),
            Arc::new(p95_latency.finish()),
            Arc::new(p99_latency.finish()),
            Arc::new(max_latency.finish()),
            Arc::new(avg_latency.finish()),
            Arc::new(throughput.finish()),
            Arc::new(recorded_at.finish()),
        ],
    )
    .map_err(|e| MetricsStoreError::Write(e.to_string()))
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray, MetricsStoreError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| MetricsStoreError::Read {
            path: path.display().to_string(),
            reason: format!("missing or mistyped column '{name}'"),
        })
}

fn u64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a UInt64Array, MetricsStoreError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| MetricsStoreError::Read {
            path: path.display().to_string(),
            reason: format!("missing or mistyped column '{name}'"),
        })
}

fn f64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Float64Array, MetricsStoreError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| MetricsStoreError::Read {
            path: path.display().to_string(),
            reason: format!("missing or mistyped column '{name}'"),
        })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn decode_runs(batch: &RecordBatch, path: &Path) -> Result<Vec<RunMetric>, MetricsStoreError> {
    let run_id = string_column(batch, "run_id", path)?;
    let pipeline_name = string_column(batch, "pipeline_name", path)?;
    let total_input = u64_column(batch, "total_input_records", path)?;
    let total_output = u64_column(batch, "total_output_records", path)?;
    let pass_rate = f64_column(batch, "overall_pass_rate", path)?;
    let duration = f64_column(batch, "duration_secs", path)?;
    let throughput = f64_column(batch, "avg_throughput", path)?;
    let num_stages = u64_column(batch, "num_stages", path)?;
    let total_errors = u64_column(batch, "total_errors", path)?;
    let recorded_at = string_column(batch, "recorded_at", path)?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(RunMetric {
            run_id: run_id.value(i).to_string(),
            pipeline_name: pipeline_name.value(i).to_string(),
            total_input_records: total_input.value(i),
            total_output_records: total_output.value(i),
            overall_pass_rate: pass_rate.value(i),
            duration_secs: duration.value(i),
            avg_throughput: throughput.value(i),
            num_stages: num_stages.value(i),
            total_errors: total_errors.value(i),
            recorded_at: parse_timestamp(recorded_at.value(i)),
        });
    }
    Ok(rows)
}

fn decode_stages(batch: &RecordBatch, path: &Path) -> Result<Vec<StageMetric>, MetricsStoreError> {
    let run_id = string_column(batch, "run_id", path)?;
    let stage_name = string_column(batch, "stage_name", path)?;
    let throughput = f64_column(batch, "avg_throughput", path)?;
    let recorded_at = string_column(batch, "recorded_at", path)?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(StageMetric {
            run_id: run_id.value(i).to_string(),
            stage_name: stage_name.value(i).to_string(),
            avg_throughput: throughput.value(i),
            recorded_at: parse_timestamp(recorded_at.value(i)),
        });
    }
    Ok(rows)
}

fn decode_operators(
    batch: &RecordBatch,
    path: &Path,
) -> Result<Vec<OperatorMetric>, MetricsStoreError> {
    let run_id = string_column(batch, "run_id", path)?;
    let stage_name = string_column(batch, "stage_name", path)?;
    let operator_name = string_column(batch, "operator_name", path)?;
    let input_records = u64_column(batch, "input_records", path)?;
    let output_records = u64_column(batch, "output_records", path)?;
    let min_latency = f64_column(batch, "min_latency", path)?;
    let p50_latency = f64_column(batch, "p50_latency", path)?;
    let p95_latency = f64_column(batch, "p95_latency", path)?;
    let p99_latency = f64_column(batch, "p99_latency", path)?;
    let max_latency = f64_column(batch, "max_latency", path)?;
    let avg_latency = f64_column(batch, "avg_latency", path)?;
    let throughput = f64_column(batch, "throughput", path)?;
    let recorded_at = string_column(batch, "recorded_at", path)?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(OperatorMetric {
            run_id: run_id.value(i).to_string(),
            stage_name: stage_name.value(i).to_string(),
            operator_name: operator_name.value(i).to_string(),
            input_records: input_records.value(i),
            output_records: output_records.value(i),
            min_latency: min_latency.value(i),
            p50_latency: p50_latency.value(i),
            p95_latency: p95_latency.value(i),
            p99_latency: p99_latency.value(i),
            max_latency: max_latency.value(i),
            avg_latency: avg_latency.value(i),
            throughput: throughput.value(i),
            recorded_at: parse_timestamp(recorded_at.value(i)),
        });
    }
    Ok(rows)
}
