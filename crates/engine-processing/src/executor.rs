use crate::{
    batcher::Batcher,
    error::{ExecutorError, StageError},
    router::RejectionRouter,
    sink_writer::SinkWriter,
    stage::{OperatorObservation, Stage},
};
use connectors::{
    metrics_store::MetricsStore,
    sink::{DataWriter, open_writer},
    source::{DataLoader, open_loader},
};
use engine_core::{
    metrics::{MetricsCollector, MetricsReport},
    plan::ExecutionPlan,
    retry::RetryPolicy,
};
use model::{
    pipeline::RetrySpec,
    records::{batch::Batch, record::Record},
};
use std::{path::Path, sync::Arc, time::Duration, time::Instant};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Lifecycle of one pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Running,
    Completed,
    Failed,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub state: RunState,
    pub metrics: MetricsReport,
}

/// Top-level driver: draws batches from the source, fans them out to a
/// bounded set of workers (each running the stage sequence serially for its
/// batch), and funnels results through a single writer loop into the accept
/// and rejection sinks. Batch completion order is irrelevant; metrics
/// aggregation is commutative.
pub struct PipelineExecutor {
    plan: ExecutionPlan,
    accept_sink: Arc<SinkWriter>,
    reject_sink: Arc<SinkWriter>,
    router: Arc<RejectionRouter>,
    metrics_store: Option<MetricsStore>,
    collector: MetricsCollector,
    cancel: CancellationToken,
    state: RunState,
}

/// Run a plan end to end with collaborators opened from its spec.
pub async fn run(
    plan: ExecutionPlan,
    cancel: CancellationToken,
) -> Result<RunSummary, ExecutorError> {
    let spec = &plan.spec;
    let loader = open_loader(Path::new(&spec.source.path), spec.source.format);
    let accept_writer: Arc<dyn DataWriter> = Arc::from(open_writer(&spec.accept_sink));
    let reject_writer: Arc<dyn DataWriter> = Arc::from(open_writer(&spec.rejection_sink));
    let metrics_store = spec.metrics_root.as_ref().map(MetricsStore::new);

    PipelineExecutor::new(plan, accept_writer, reject_writer, metrics_store, cancel)
        .run(loader)
        .await
}

impl PipelineExecutor {
    pub fn new(
        plan: ExecutionPlan,
        accept_writer: Arc<dyn DataWriter>,
        reject_writer: Arc<dyn DataWriter>,
        metrics_store: Option<MetricsStore>,
        cancel: CancellationToken,
    ) -> Self {
        let retry = retry_policy(plan.spec.retry.as_ref());
        let router = Arc::new(RejectionRouter::from_sink_spec(&plan.spec.rejection_sink));

        Self {
            accept_sink: Arc::new(SinkWriter::new(accept_writer, retry.clone(), "accept")),
            reject_sink: Arc::new(SinkWriter::new(reject_writer, retry, "rejection")),
            router,
            plan,
            metrics_store,
            collector: MetricsCollector::new(),
            cancel,
            state: RunState::Initialized,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(mut self, loader: Box<dyn DataLoader>) -> Result<RunSummary, ExecutorError> {
        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        info!(
            run_id = %run_id,
            pipeline = %self.plan.spec.name,
            stages = self.plan.stages.len(),
            "Starting pipeline run"
        );

        self.state = RunState::Running;
        let started = Instant::now();
        let timeout = self.arm_timeout();

        match self.process(loader).await {
            Ok(()) => {
                // Duration covers the Running phase only; metrics
                // persistence and sink close stay out of throughput numbers.
                let duration = started.elapsed();
                self.complete(&run_id, duration).await
            }
            Err(err) => {
                self.state = RunState::Failed;
                let err = match (err, timeout) {
                    (ExecutorError::Cancelled, Some(timeout)) if timeout.expired() => {
                        ExecutorError::TimedOut(timeout.secs)
                    }
                    (err, _) => err,
                };
                error!(run_id = %run_id, error = %err, "Pipeline run failed");
                Err(err)
            }
        }
    }

    /// Per-run wall-clock budget. Expiry trips the cancellation token, so
    /// the run stops between batches like any other cancellation.
    fn arm_timeout(&self) -> Option<TimeoutGuard> {
        let secs = self.plan.spec.timeout_secs?;
        let expired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let cancel = self.cancel.clone();
        let flag = expired.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    warn!(timeout_s = secs, "Run timed out, requesting cancellation");
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });
        Some(TimeoutGuard { secs, expired })
    }

    async fn complete(
        mut self,
        run_id: &str,
        duration: Duration,
    ) -> Result<RunSummary, ExecutorError> {
        let metrics = self.collector.finalize(
            run_id,
            &self.plan.spec.name,
            self.plan.num_stages(),
            duration,
        )?;

        if let Some(store) = &self.metrics_store {
            store.persist(&metrics.run, &metrics.stages, &metrics.operators)?;
        }

        self.accept_sink
            .close()
            .await
            .map_err(|source| ExecutorError::SinkClose {
                sink: "accept",
                source,
            })?;
        self.reject_sink
            .close()
            .await
            .map_err(|source| ExecutorError::SinkClose {
                sink: "rejection",
                source,
            })?;

        self.state = RunState::Completed;
        info!(
            run_id = %run_id,
            input = metrics.run.total_input_records,
            output = metrics.run.total_output_records,
            pass_rate = format!("{:.2}", metrics.run.overall_pass_rate),
            duration_s = format!("{:.2}", duration.as_secs_f64()),
            "Pipeline run completed"
        );

        Ok(RunSummary {
            run_id: run_id.to_string(),
            state: RunState::Completed,
            metrics,
        })
    }

    async fn process(&mut self, loader: Box<dyn DataLoader>) -> Result<(), ExecutorError> {
        let max_in_flight = self.plan.spec.max_in_flight;
        let stages: Arc<Vec<Stage>> =
            Arc::new(self.plan.stages.iter().map(Stage::from_plan).collect());

        let (tx, rx) = mpsc::channel::<ProcessedBatch>(max_in_flight);
        let writer_handle = tokio::spawn(writer_loop(
            rx,
            self.accept_sink.clone(),
            self.reject_sink.clone(),
            self.router.clone(),
            self.collector.clone(),
        ));

        let mut batcher = Batcher::new(loader, self.plan.spec.batch_size);
        let mut workers: JoinSet<Result<(), ExecutorError>> = JoinSet::new();
        let mut fatal: Option<ExecutorError> = None;

        loop {
            // Cooperative cancellation between batches; anything already
            // dispatched runs to completion below.
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested, stopping batch dispatch");
                fatal = Some(ExecutorError::Cancelled);
                break;
            }

            if workers.len() >= max_in_flight {
                if let Some(joined) = workers.join_next().await {
                    if let Err(err) = flatten_join(joined) {
                        fatal = Some(err);
                        break;
                    }
                }
                continue;
            }

            match batcher.next_batch().await {
                Ok(Some(batch)) => {
                    let stages = stages.clone();
                    let tx = tx.clone();
                    let collector = self.collector.clone();
                    let cancel = self.cancel.clone();
                    let max_faults = self.plan.spec.max_operator_faults;
                    workers.spawn(async move {
                        run_worker(stages, batch, tx, collector, cancel, max_faults).await
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    fatal = Some(err.into());
                    break;
                }
            }
        }

        // Drain in-flight workers. A specific stage or sink error beats the
        // bare Cancelled marker set when a faulting worker tripped the
        // token.
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = flatten_join(joined) {
                record_fatal(&mut fatal, err);
            }
        }

        drop(tx);
        if let Err(err) = writer_handle.await? {
            record_fatal(&mut fatal, err);
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct TimeoutGuard {
    secs: u64,
    expired: Arc<std::sync::atomic::AtomicBool>,
}

impl TimeoutGuard {
    fn expired(&self) -> bool {
        self.expired.load(std::sync::atomic::Ordering::SeqCst)
    }
}

fn retry_policy(spec: Option<&RetrySpec>) -> RetryPolicy {
    match spec {
        Some(spec) => RetryPolicy::new(
            spec.max_attempts,
            Duration::from_millis(spec.base_delay_ms),
            Duration::from_millis(spec.max_delay_ms),
        ),
        None => RetryPolicy::for_sink(),
    }
}

struct ProcessedBatch {
    batch_id: String,
    input_records: u64,
    accepted: Vec<Record>,
    rejected: Vec<Record>,
    observations: Vec<(String, OperatorObservation)>,
}

/// Run one batch through every stage in order. Stage execution within a
/// batch is strictly sequential; parallelism only exists across batches.
fn process_batch(stages: &[Stage], batch: Batch) -> Result<ProcessedBatch, StageError> {
    let batch_id = batch.id.clone();
    let input_records = batch.len() as u64;
    let mut current = batch.records;
    let mut rejected = Vec::new();
    let mut observations = Vec::new();

    for stage in stages {
        let outcome = stage.run(current)?;
        current = outcome.accepted;
        rejected.extend(outcome.rejected);
        observations.extend(
            outcome
                .observations
                .into_iter()
                .map(|obs| (stage.name().to_string(), obs)),
        );
    }

    Ok(ProcessedBatch {
        batch_id,
        input_records,
        accepted: current,
        rejected,
        observations,
    })
}

async fn run_worker(
    stages: Arc<Vec<Stage>>,
    batch: Batch,
    tx: mpsc::Sender<ProcessedBatch>,
    collector: MetricsCollector,
    cancel: CancellationToken,
    max_faults: u64,
) -> Result<(), ExecutorError> {
    let batch_id = batch.id.clone();
    match process_batch(&stages, batch) {
        Ok(processed) => {
            // A closed channel means the writer already failed; its error
            // takes precedence over anything this worker could report.
            let _ = tx.send(processed).await;
            Ok(())
        }
        Err(source) => {
            collector.increment_errors(1);
            let faults = collector.total_errors();
            if faults > max_faults {
                cancel.cancel();
                return Err(ExecutorError::Stage { batch_id, source });
            }
            warn!(
                batch_id = %batch_id,
                error = %source,
                faults,
                max_faults,
                "Operator fault tolerated, batch discarded"
            );
            Ok(())
        }
    }
}

async fn writer_loop(
    mut rx: mpsc::Receiver<ProcessedBatch>,
    accept_sink: Arc<SinkWriter>,
    reject_sink: Arc<SinkWriter>,
    router: Arc<RejectionRouter>,
    collector: MetricsCollector,
) -> Result<(), ExecutorError> {
    while let Some(processed) = rx.recv().await {
        let batch_id = processed.batch_id.clone();

        for (stage, obs) in &processed.observations {
            collector.record_operator(
                stage,
                &obs.operator,
                obs.input_records,
                obs.output_records,
                obs.elapsed,
            );
        }
        collector.record_batch_io(processed.input_records, processed.accepted.len() as u64);

        accept_sink
            .write(&processed.accepted)
            .await
            .map_err(|source| ExecutorError::Sink {
                batch_id: batch_id.clone(),
                sink: "accept",
                source,
            })?;

        if router.is_partitioned() {
            for (key, group) in router.route(processed.rejected) {
                reject_sink
                    .write_partition(&key, &group)
                    .await
                    .map_err(|source| ExecutorError::Sink {
                        batch_id: batch_id.clone(),
                        sink: "rejection",
                        source,
                    })?;
            }
        } else {
            reject_sink
                .write(&processed.rejected)
                .await
                .map_err(|source| ExecutorError::Sink {
                    batch_id,
                    sink: "rejection",
                    source,
                })?;
        }
    }
    Ok(())
}

fn flatten_join(
    joined: Result<Result<(), ExecutorError>, tokio::task::JoinError>,
) -> Result<(), ExecutorError> {
    joined?
}

fn record_fatal(fatal: &mut Option<ExecutorError>, err: ExecutorError) {
    match fatal {
        None | Some(ExecutorError::Cancelled) => *fatal = Some(err),
        Some(_) => {}
    }
}
