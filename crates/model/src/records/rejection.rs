use serde::{Deserialize, Serialize};

/// Field under which rejection provenance is embedded when a record is
/// serialized, and the default nested path the rejection sink partitions on.
pub const REJECTION_FIELD: &str = "_rejection_details";

/// Provenance attached to a record when an operator removes it from the
/// accept path. Attached exactly once; a record rejected upstream keeps its
/// original details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionDetails {
    pub operator: String,
    pub stage: String,
    pub reason: String,
}

impl RejectionDetails {
    pub fn new(
        operator: impl Into<String>,
        stage: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            operator: operator.into(),
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RejectionDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rejected by '{}' in stage '{}': {}",
            self.operator, self.stage, self.reason
        )
    }
}
