#[cfg(test)]
mod tests {
    use crate::reference_workload;
    use connectors::metrics_store::MetricsStore;
    use engine_core::plan::ExecutionPlan;
    use engine_processing::{executor, operators::builtin_registry};
    use model::pipeline::PipelineSpec;
    use std::{io::Write, path::Path};
    use tokio_util::sync::CancellationToken;

    fn write_input_jsonl(dir: &Path) -> String {
        let path = dir.join("input.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        for record in reference_workload(100, 40, 5) {
            writeln!(
                file,
                "{}",
                serde_json::to_string(&record.to_json()).unwrap()
            )
            .unwrap();
        }
        path.display().to_string()
    }

    fn filesystem_spec(dir: &Path, source_path: &str) -> PipelineSpec {
        serde_json::from_value(serde_json::json!({
            "name": "curation",
            "source": {"path": source_path},
            "batch_size": 100,
            "max_in_flight": 2,
            "metrics_root": dir.join("metrics").display().to_string(),
            "stages": [
                {"name": "stage_a", "operators": [
                    {"op": "threshold_filter", "params": {"field": "score", "min": 0.5}}
                ]},
                {"name": "stage_b", "operators": [
                    {"op": "key_dedup", "params": {"key_fields": ["url"]}}
                ]}
            ],
            "accept_sink": {
                "path": dir.join("accepted").display().to_string(),
                "format": "parquet"
            },
            "rejection_sink": {
                "path": dir.join("rejected").display().to_string(),
                "format": "parquet",
                "partition_by": "operator",
                "partition_key_extractor": "_rejection_details.operator"
            }
        }))
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn jsonl_to_parquet_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = write_input_jsonl(dir.path());
        let spec = filesystem_spec(dir.path(), &source_path);
        let plan = ExecutionPlan::build(spec, &builtin_registry()).unwrap();

        let summary = executor::run(plan, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.metrics.run.total_output_records, 55);

        // Accept sink holds parquet part files.
        let accepted: Vec<_> = std::fs::read_dir(dir.path().join("accepted"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(!accepted.is_empty());
        assert!(accepted.iter().all(|f| f.ends_with(".parquet")));

        // Rejection sink is partitioned by rejecting operator.
        let rejected_root = dir.path().join("rejected");
        assert!(rejected_root.join("operator=threshold_filter").is_dir());
        assert!(rejected_root.join("operator=key_dedup").is_dir());

        // All three metric tiers landed under the metrics root.
        let metrics_root = dir.path().join("metrics");
        for tier in ["runs", "stages", "operators"] {
            assert!(metrics_root.join(tier).is_dir(), "missing tier {tier}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn metrics_history_unions_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = write_input_jsonl(dir.path());

        for _ in 0..2 {
            let spec = filesystem_spec(dir.path(), &source_path);
            let plan = ExecutionPlan::build(spec, &builtin_registry()).unwrap();
            executor::run(plan, CancellationToken::new()).await.unwrap();
        }

        let store = MetricsStore::new(dir.path().join("metrics"));
        let runs = store.load_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.pipeline_name == "curation"));
        assert!(runs.iter().all(|r| r.total_input_records == 100));

        let stages = store.load_stages().unwrap();
        assert_eq!(stages.len(), 4);

        let operators = store.load_operators().unwrap();
        assert_eq!(operators.len(), 4);
        // Rows from different runs stay distinguishable.
        let run_ids: std::collections::HashSet<&str> =
            operators.iter().map(|op| op.run_id.as_str()).collect();
        assert_eq!(run_ids.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn persisted_run_metrics_match_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = write_input_jsonl(dir.path());
        let spec = filesystem_spec(dir.path(), &source_path);
        let plan = ExecutionPlan::build(spec, &builtin_registry()).unwrap();

        let summary = executor::run(plan, CancellationToken::new()).await.unwrap();

        let store = MetricsStore::new(dir.path().join("metrics"));
        let persisted = &store.load_runs().unwrap()[0];
        assert_eq!(persisted.run_id, summary.run_id);
        assert_eq!(persisted.total_input_records, 100);
        assert_eq!(persisted.total_output_records, 55);
        assert_eq!(persisted.overall_pass_rate, 55.0);
        assert_eq!(persisted.num_stages, 2);
    }
}
