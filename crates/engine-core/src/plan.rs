use crate::{error::PlanError, operator::Operator, registry::OperatorRegistry};
use model::pipeline::{PipelineSpec, StageSpec};
use std::collections::HashSet;
use tracing::info;

/// A stage with its operators resolved and constructed.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub name: String,
    pub operators: Vec<Operator>,
}

/// A pipeline spec validated against the registry. Building the plan is the
/// fail-fast boundary: every configuration error surfaces here, before any
/// record is read.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub spec: PipelineSpec,
    pub stages: Vec<StagePlan>,
}

impl ExecutionPlan {
    pub fn build(spec: PipelineSpec, registry: &OperatorRegistry) -> Result<Self, PlanError> {
        if spec.stages.is_empty() {
            return Err(PlanError::NoStages(spec.name.clone()));
        }
        if spec.batch_size == 0 {
            return Err(PlanError::ZeroBatchSize);
        }
        if spec.max_in_flight == 0 {
            return Err(PlanError::ZeroMaxInFlight);
        }

        let mut seen = HashSet::new();
        let mut stages = Vec::with_capacity(spec.stages.len());
        for stage_spec in &spec.stages {
            if !seen.insert(stage_spec.name.clone()) {
                return Err(PlanError::DuplicateStage(stage_spec.name.clone()));
            }
            stages.push(Self::build_stage(stage_spec, registry)?);
        }

        info!(
            pipeline = %spec.name,
            stages = stages.len(),
            operators = stages.iter().map(|s| s.operators.len()).sum::<usize>(),
            "Execution plan built"
        );

        Ok(Self { spec, stages })
    }

    fn build_stage(
        stage_spec: &StageSpec,
        registry: &OperatorRegistry,
    ) -> Result<StagePlan, PlanError> {
        if stage_spec.operators.is_empty() {
            return Err(PlanError::EmptyStage(stage_spec.name.clone()));
        }

        let mut operators = Vec::with_capacity(stage_spec.operators.len());
        for op_spec in &stage_spec.operators {
            let operator =
                registry
                    .resolve(&op_spec.op, &op_spec.params)
                    .map_err(|source| PlanError::Operator {
                        stage: stage_spec.name.clone(),
                        source,
                    })?;
            operators.push(operator);
        }

        Ok(StagePlan {
            name: stage_spec.name.clone(),
            operators,
        })
    }

    pub fn num_stages(&self) -> u64 {
        self.stages.len() as u64
    }
}
