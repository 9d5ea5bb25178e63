use crate::error::StageError;
use engine_core::{
    operator::{Operator, OperatorKind},
    plan::StagePlan,
};
use model::records::{record::Record, rejection::RejectionDetails};
use std::time::{Duration, Instant};
use tracing::debug;

/// Engine-side timing of one operator over one batch. The engine measures
/// wall clock around the invocation so measurement semantics are uniform
/// across operator implementations.
#[derive(Debug, Clone)]
pub struct OperatorObservation {
    pub operator: String,
    pub input_records: u64,
    pub output_records: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct StageOutcome {
    pub accepted: Vec<Record>,
    pub rejected: Vec<Record>,
    pub observations: Vec<OperatorObservation>,
}

/// An ordered list of operators applied in sequence to a batch. A record
/// rejected by operator k is removed from the batch presented to operator
/// k+1, so it never incurs later operators' latency.
pub struct Stage {
    name: String,
    operators: Vec<Operator>,
}

impl Stage {
    pub fn new(name: impl Into<String>, operators: Vec<Operator>) -> Self {
        Self {
            name: name.into(),
            operators,
        }
    }

    pub fn from_plan(plan: &StagePlan) -> Self {
        Self::new(plan.name.clone(), plan.operators.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the batch through every operator in order. An operator fault
    /// aborts the whole batch; partial results are discarded so metrics and
    /// rejection bookkeeping stay consistent.
    pub fn run(&self, records: Vec<Record>) -> Result<StageOutcome, StageError> {
        let mut current = records;
        let mut rejected = Vec::new();
        let mut observations = Vec::with_capacity(self.operators.len());

        for operator in &self.operators {
            let input_count = current.len() as u64;
            let start = Instant::now();
            let step = self.apply_operator(operator, std::mem::take(&mut current))?;
            let elapsed = start.elapsed();

            current = step.kept;
            for (mut record, reason) in step.rejected {
                record.reject(RejectionDetails::new(operator.name(), &self.name, reason));
                rejected.push(record);
            }

            observations.push(OperatorObservation {
                operator: operator.name().to_string(),
                input_records: input_count,
                output_records: current.len() as u64,
                elapsed,
            });
        }

        debug!(
            stage = %self.name,
            accepted = current.len(),
            rejected = rejected.len(),
            "Stage completed"
        );

        Ok(StageOutcome {
            accepted: current,
            rejected,
            observations,
        })
    }

    fn apply_operator(
        &self,
        operator: &Operator,
        records: Vec<Record>,
    ) -> Result<StepOutcome, StageError> {
        let fault = |source| StageError::OperatorFault {
            stage: self.name.clone(),
            operator: operator.name().to_string(),
            source,
        };

        match operator.kind() {
            OperatorKind::Filter(filter) => {
                let mut kept = Vec::with_capacity(records.len());
                let mut rejected = Vec::new();
                for record in records {
                    let decision = filter.evaluate(&record).map_err(fault)?;
                    if decision.accept {
                        kept.push(record);
                    } else {
                        let reason = decision.reason.unwrap_or_else(|| "rejected".to_string());
                        rejected.push((record, reason));
                    }
                }
                Ok(StepOutcome { kept, rejected })
            }
            OperatorKind::Deduplicator(dedup) => {
                let outcome = dedup.dedupe(records).map_err(fault)?;
                Ok(StepOutcome {
                    kept: outcome.kept,
                    rejected: outcome.rejected,
                })
            }
            OperatorKind::Refiner(refiner) => {
                let mut kept = Vec::with_capacity(records.len());
                let mut rejected = Vec::new();
                for record in records {
                    // The refiner consumes the record; keep a copy so a
                    // transformation-level rejection still has something to
                    // route.
                    let original = record.clone();
                    match refiner.refine(record).map_err(fault)? {
                        Some(refined) => kept.push(refined),
                        None => rejected.push((original, "refined to no record".to_string())),
                    }
                }
                Ok(StepOutcome { kept, rejected })
            }
        }
    }
}

struct StepOutcome {
    kept: Vec<Record>,
    rejected: Vec<(Record, String)>,
}
