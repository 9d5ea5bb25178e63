#[cfg(test)]
mod tests {
    use crate::{reference_workload, scored_record};
    use connectors::{sink::MemoryWriter, source::MemoryLoader};
    use engine_core::plan::ExecutionPlan;
    use engine_processing::{
        executor::{PipelineExecutor, RunState, RunSummary},
        operators::builtin_registry,
    };
    use model::{pipeline::PipelineSpec, records::record::Record};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn curation_spec(batch_size: usize, max_in_flight: usize) -> PipelineSpec {
        serde_json::from_value(serde_json::json!({
            "name": "curation",
            "source": {"path": "unused.jsonl"},
            "batch_size": batch_size,
            "max_in_flight": max_in_flight,
            "stages": [
                {"name": "stage_a", "operators": [
                    {"op": "threshold_filter", "params": {"field": "score", "min": 0.5}}
                ]},
                {"name": "stage_b", "operators": [
                    {"op": "key_dedup", "params": {"key_fields": ["url"]}}
                ]}
            ],
            "accept_sink": {"path": "unused"},
            "rejection_sink": {
                "path": "unused",
                "partition_by": "operator",
                "partition_key_extractor": "_rejection_details.operator"
            }
        }))
        .unwrap()
    }

    async fn run_in_memory(
        spec: PipelineSpec,
        records: Vec<Record>,
    ) -> (RunSummary, Arc<MemoryWriter>, Arc<MemoryWriter>) {
        let plan = ExecutionPlan::build(spec, &builtin_registry()).expect("valid plan");
        let accept = Arc::new(MemoryWriter::new());
        let reject = Arc::new(MemoryWriter::new());
        let summary = PipelineExecutor::new(
            plan,
            accept.clone(),
            reject.clone(),
            None,
            CancellationToken::new(),
        )
        .run(Box::new(MemoryLoader::new(records)))
        .await
        .expect("run completes");
        (summary, accept, reject)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reference_scenario_hits_the_expected_numbers() {
        // 100 records: 40 below the score threshold, 5 duplicate pairs (10
        // records) among the 60 that pass.
        let records = reference_workload(100, 40, 5);
        let (summary, accept, reject) = run_in_memory(curation_spec(100, 1), records).await;

        let run = &summary.metrics.run;
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(run.total_input_records, 100);
        assert_eq!(run.total_output_records, 55);
        assert_eq!(run.overall_pass_rate, 55.0);
        assert_eq!(run.num_stages, 2);
        assert_eq!(run.total_errors, 0);

        let filter = summary
            .metrics
            .operators
            .iter()
            .find(|op| op.operator_name == "threshold_filter")
            .unwrap();
        assert_eq!(filter.input_records, 100);
        assert_eq!(filter.output_records, 60);

        let dedup = summary
            .metrics
            .operators
            .iter()
            .find(|op| op.operator_name == "key_dedup")
            .unwrap();
        assert_eq!(dedup.input_records, 60);
        assert_eq!(dedup.output_records, 55);

        assert_eq!(accept.records().len(), 55);

        // 45 rejected records, partitioned by rejecting operator.
        assert_eq!(reject.partition("threshold_filter").len(), 40);
        assert_eq!(reject.partition("key_dedup").len(), 5);
        assert_eq!(reject.partition_keys().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejections_carry_immutable_provenance() {
        let records = reference_workload(20, 5, 3);
        let (_, _, reject) = run_in_memory(curation_spec(20, 1), records).await;

        for record in reject.partition("threshold_filter") {
            let details = record.rejection().expect("provenance attached");
            assert_eq!(details.operator, "threshold_filter");
            assert_eq!(details.stage, "stage_a");
        }
        for record in reject.partition("key_dedup") {
            let details = record.rejection().expect("provenance attached");
            assert_eq!(details.operator, "key_dedup");
            assert_eq!(details.stage, "stage_b");
            assert!(details.reason.contains("duplicate of key"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn adjacent_stage_totals_line_up_across_batches() {
        // Many batches, parallel dispatch; per-operator totals must still
        // satisfy: stage N output == stage N+1 input, and output <= input.
        let records: Vec<Record> = (0..500)
            .map(|i| scored_record(&format!("u{i}"), if i % 5 == 0 { 0.1 } else { 0.9 }))
            .collect();
        let (summary, _, _) = run_in_memory(curation_spec(32, 4), records).await;

        let run = &summary.metrics.run;
        assert!(run.total_output_records <= run.total_input_records);

        let filter = &summary.metrics.operators[0];
        let dedup = &summary.metrics.operators[1];
        assert_eq!(filter.stage_name, "stage_a");
        assert_eq!(dedup.stage_name, "stage_b");
        assert_eq!(filter.output_records, dedup.input_records);
        assert_eq!(run.total_input_records, filter.input_records);
        assert_eq!(run.total_output_records, dedup.output_records);
    }

    #[tokio::test]
    async fn empty_input_completes_with_zero_pass_rate() {
        let (summary, accept, reject) = run_in_memory(curation_spec(10, 1), Vec::new()).await;

        let run = &summary.metrics.run;
        assert_eq!(run.total_input_records, 0);
        assert_eq!(run.total_output_records, 0);
        assert_eq!(run.overall_pass_rate, 0.0);
        assert!(accept.records().is_empty());
        assert!(reject.partition_keys().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_boundaries_do_not_change_filter_results() {
        let records = reference_workload(60, 20, 0);

        let (small, _, _) = run_in_memory(curation_spec(7, 1), records.clone()).await;
        let (large, _, _) = run_in_memory(curation_spec(60, 1), records).await;

        // No duplicates in the workload, so batch size must not matter at
        // all, down to identical totals.
        assert_eq!(
            small.metrics.run.total_output_records,
            large.metrics.run.total_output_records
        );
        assert_eq!(small.metrics.run.total_input_records, 60);
    }
}
