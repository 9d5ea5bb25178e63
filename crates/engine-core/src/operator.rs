use crate::error::OperatorError;
use model::records::record::Record;
use std::sync::Arc;

/// Outcome of a filter evaluation for a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDecision {
    pub accept: bool,
    pub reason: Option<String>,
}

impl FilterDecision {
    pub fn accept() -> Self {
        Self {
            accept: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accept: false,
            reason: Some(reason.into()),
        }
    }
}

/// Outcome of deduplicating one batch. `kept` preserves batch order;
/// `rejected` carries one entry per dropped duplicate with its reason.
#[derive(Debug, Default)]
pub struct DedupeOutcome {
    pub kept: Vec<Record>,
    pub rejected: Vec<(Record, String)>,
}

/// Per-record accept/reject decision. Must be a pure function of the record
/// and deterministic for identical input.
pub trait Filter: Send + Sync {
    fn evaluate(&self, record: &Record) -> Result<FilterDecision, OperatorError>;
}

/// Batch-granularity duplicate removal. Each batch is deduplicated
/// independently; cross-batch detection is the caller's concern (supply a
/// wider batch). The kept record of a duplicate cluster is the first seen in
/// batch order.
pub trait Deduplicator: Send + Sync {
    fn dedupe(&self, records: Vec<Record>) -> Result<DedupeOutcome, OperatorError>;
}

/// Per-record transformation producing zero or one records. Returning `None`
/// rejects the record, attributed to this refiner.
pub trait Refiner: Send + Sync {
    fn refine(&self, record: Record) -> Result<Option<Record>, OperatorError>;
}

/// A named unit of decision/transformation logic. Closed over the three
/// capability shapes; the stage driver dispatches on the variant.
#[derive(Clone)]
pub struct Operator {
    name: String,
    kind: OperatorKind,
}

#[derive(Clone)]
pub enum OperatorKind {
    Filter(Arc<dyn Filter>),
    Deduplicator(Arc<dyn Deduplicator>),
    Refiner(Arc<dyn Refiner>),
}

impl Operator {
    pub fn filter(name: impl Into<String>, filter: impl Filter + 'static) -> Self {
        Self {
            name: name.into(),
            kind: OperatorKind::Filter(Arc::new(filter)),
        }
    }

    pub fn deduplicator(name: impl Into<String>, dedup: impl Deduplicator + 'static) -> Self {
        Self {
            name: name.into(),
            kind: OperatorKind::Deduplicator(Arc::new(dedup)),
        }
    }

    pub fn refiner(name: impl Into<String>, refiner: impl Refiner + 'static) -> Self {
        Self {
            name: name.into(),
            kind: OperatorKind::Refiner(Arc::new(refiner)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            OperatorKind::Filter(_) => "Filter",
            OperatorKind::Deduplicator(_) => "Deduplicator",
            OperatorKind::Refiner(_) => "Refiner",
        };
        write!(f, "Operator({kind} '{}')", self.name)
    }
}
