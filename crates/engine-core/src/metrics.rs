use crate::error::MetricsError;
use model::metrics::{OperatorMetric, RunMetric, StageMetric};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Debug)]
struct OperatorAccumulator {
    stage: String,
    operator: String,
    input_records: u64,
    output_records: u64,
    elapsed_secs: f64,
    latency_samples: Vec<f64>,
}

#[derive(Debug, Default)]
struct InnerCollector {
    // Insertion-ordered so finalized rows come out in pipeline order.
    accumulators: Mutex<Vec<OperatorAccumulator>>,
    total_input: AtomicU64,
    total_output: AtomicU64,
    total_errors: AtomicU64,
    finalized: AtomicBool,
}

/// Accumulates per-(stage, operator) counters and latency samples plus run
/// totals. Updates are additive and commutative, so concurrent batches may
/// report in any order without changing the final aggregate. Cheap to clone
/// and share across workers.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<InnerCollector>,
}

/// The three finalized metric tiers for one run.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub run: RunMetric,
    pub stages: Vec<StageMetric>,
    pub operators: Vec<OperatorMetric>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operator invocation over one batch. `elapsed` is the
    /// engine-measured wall clock of the invocation; one latency sample is
    /// kept per call.
    pub fn record_operator(
        &self,
        stage: &str,
        operator: &str,
        input_records: u64,
        output_records: u64,
        elapsed: Duration,
    ) {
        let secs = elapsed.as_secs_f64();
        let mut accumulators = self
            .inner
            .accumulators
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(acc) = accumulators
            .iter_mut()
            .find(|a| a.stage == stage && a.operator == operator)
        {
            acc.input_records += input_records;
            acc.output_records += output_records;
            acc.elapsed_secs += secs;
            acc.latency_samples.push(secs);
        } else {
            accumulators.push(OperatorAccumulator {
                stage: stage.to_string(),
                operator: operator.to_string(),
                input_records,
                output_records,
                elapsed_secs: secs,
                latency_samples: vec![secs],
            });
        }
    }

    /// Record one batch's entry into the first stage and exit from the last.
    pub fn record_batch_io(&self, input_records: u64, output_records: u64) {
        self.inner
            .total_input
            .fetch_add(input_records, Ordering::Relaxed);
        self.inner
            .total_output
            .fetch_add(output_records, Ordering::Relaxed);
    }

    pub fn increment_errors(&self, count: u64) {
        self.inner.total_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn total_errors(&self) -> u64 {
        self.inner.total_errors.load(Ordering::Relaxed)
    }

    /// Reduce the accumulated samples into the three metric tiers. Callable
    /// exactly once per run; a second call fails deterministically.
    pub fn finalize(
        &self,
        run_id: &str,
        pipeline_name: &str,
        num_stages: u64,
        duration: Duration,
    ) -> Result<MetricsReport, MetricsError> {
        if self.inner.finalized.swap(true, Ordering::SeqCst) {
            return Err(MetricsError::AlreadyFinalized);
        }

        let recorded_at = chrono::Utc::now();
        let accumulators = self
            .inner
            .accumulators
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut operators = Vec::with_capacity(accumulators.len());
        for acc in accumulators.iter() {
            let mut samples = acc.latency_samples.clone();
            samples.sort_by(|a, b| a.total_cmp(b));
            let avg = if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            };
            operators.push(OperatorMetric {
                run_id: run_id.to_string(),
                stage_name: acc.stage.clone(),
                operator_name: acc.operator.clone(),
                input_records: acc.input_records,
                output_records: acc.output_records,
                min_latency: samples.first().copied().unwrap_or(0.0),
                p50_latency: percentile(&samples, 0.50),
                p95_latency: percentile(&samples, 0.95),
                p99_latency: percentile(&samples, 0.99),
                max_latency: samples.last().copied().unwrap_or(0.0),
                avg_latency: avg,
                throughput: throughput(acc.input_records, acc.elapsed_secs),
                recorded_at,
            });
        }

        // Stage rows, in first-appearance order. Stage input is the input of
        // its first operator (operators run in strict sequence); stage time
        // is the sum of its operators' wall time.
        let mut stages: Vec<StageMetric> = Vec::new();
        for acc in accumulators.iter() {
            if stages.iter().any(|s| s.stage_name == acc.stage) {
                continue;
            }
            let stage_accs: Vec<&OperatorAccumulator> = accumulators
                .iter()
                .filter(|a| a.stage == acc.stage)
                .collect();
            let stage_input = stage_accs.first().map_or(0, |a| a.input_records);
            let stage_elapsed: f64 = stage_accs.iter().map(|a| a.elapsed_secs).sum();
            stages.push(StageMetric {
                run_id: run_id.to_string(),
                stage_name: acc.stage.clone(),
                avg_throughput: throughput(stage_input, stage_elapsed),
                recorded_at,
            });
        }

        let total_input = self.inner.total_input.load(Ordering::Relaxed);
        let total_output = self.inner.total_output.load(Ordering::Relaxed);
        let duration_secs = duration.as_secs_f64();
        let run = RunMetric {
            run_id: run_id.to_string(),
            pipeline_name: pipeline_name.to_string(),
            total_input_records: total_input,
            total_output_records: total_output,
            overall_pass_rate: RunMetric::pass_rate(total_input, total_output),
            duration_secs,
            avg_throughput: throughput(total_input, duration_secs),
            num_stages,
            total_errors: self.inner.total_errors.load(Ordering::Relaxed),
            recorded_at,
        };

        Ok(MetricsReport {
            run,
            stages,
            operators,
        })
    }
}

fn throughput(records: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        0.0
    } else {
        records as f64 / elapsed_secs
    }
}

/// Percentile of a sorted sample set by linear interpolation between the
/// nearest ranks (`rank = (n - 1) * q`).
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() - 1) as f64 * q;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_linear_interpolation() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 0.50), 3.0);
        assert!((percentile(&samples, 0.95) - 4.8).abs() < 1e-9);
        assert!((percentile(&samples, 0.99) - 4.96).abs() < 1e-9);
        assert_eq!(percentile(&samples, 1.0), 5.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[2.5], 0.99), 2.5);
    }

    #[test]
    fn finalize_reduces_all_tiers() {
        let collector = MetricsCollector::new();
        for secs in [1.0, 2.0, 3.0, 4.0, 5.0] {
            collector.record_operator(
                "stage_a",
                "filter",
                20,
                12,
                Duration::from_secs_f64(secs),
            );
        }
        collector.record_operator("stage_b", "dedup", 60, 55, Duration::from_secs(1));
        collector.record_batch_io(100, 55);
        collector.increment_errors(2);

        let report = collector
            .finalize("run-1", "curation", 2, Duration::from_secs(10))
            .unwrap();

        assert_eq!(report.operators.len(), 2);
        let filter = &report.operators[0];
        assert_eq!(filter.stage_name, "stage_a");
        assert_eq!(filter.input_records, 100);
        assert_eq!(filter.output_records, 60);
        assert_eq!(filter.min_latency, 1.0);
        assert_eq!(filter.p50_latency, 3.0);
        assert_eq!(filter.max_latency, 5.0);
        assert_eq!(filter.avg_latency, 3.0);
        // 100 records over 15s of operator wall time.
        assert!((filter.throughput - 100.0 / 15.0).abs() < 1e-9);

        assert_eq!(report.stages.len(), 2);
        assert_eq!(report.stages[0].stage_name, "stage_a");

        assert_eq!(report.run.total_input_records, 100);
        assert_eq!(report.run.total_output_records, 55);
        assert_eq!(report.run.overall_pass_rate, 55.0);
        assert_eq!(report.run.num_stages, 2);
        assert_eq!(report.run.total_errors, 2);
        assert!((report.run.avg_throughput - 10.0).abs() < 1e-9);
    }

    #[test]
    fn second_finalize_fails_deterministically() {
        let collector = MetricsCollector::new();
        collector.record_batch_io(1, 1);
        collector
            .finalize("run-1", "p", 1, Duration::from_secs(1))
            .unwrap();

        for _ in 0..3 {
            let err = collector
                .finalize("run-1", "p", 1, Duration::from_secs(1))
                .unwrap_err();
            assert!(matches!(err, MetricsError::AlreadyFinalized));
        }
    }

    #[test]
    fn concurrent_updates_commute() {
        let collector = MetricsCollector::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let collector = collector.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    collector.record_operator(
                        "s",
                        "op",
                        10,
                        9,
                        Duration::from_millis(1),
                    );
                    collector.record_batch_io(10, 9);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let report = collector
            .finalize("run-1", "p", 1, Duration::from_secs(1))
            .unwrap();
        assert_eq!(report.operators[0].input_records, 8_000);
        assert_eq!(report.operators[0].output_records, 7_200);
        assert_eq!(report.run.total_input_records, 8_000);
    }
}
