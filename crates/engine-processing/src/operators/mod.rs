//! Built-in operator catalog.
//!
//! Generic, schema-agnostic operators that cover the common curation moves;
//! domain-specific operators are registered by their own crates through the
//! same registry surface. `builtin_registry` is the startup entry point that
//! pipeline spec files resolve names against.

use engine_core::{
    error::{OperatorError, RegistryError},
    registry::OperatorRegistry,
};

pub mod dedup;
pub mod filters;
pub mod refiners;

pub use dedup::KeyDeduplicator;
pub use filters::{RequiredFieldsFilter, ThresholdFilter};
pub use refiners::{ProjectRefiner, RenameRefiner};

/// Register every built-in operator with the given registry.
pub fn register_builtins(registry: &OperatorRegistry) -> Result<(), RegistryError> {
    registry.register("threshold_filter", filters::threshold_filter)?;
    registry.register("required_fields", filters::required_fields)?;
    registry.register("key_dedup", dedup::key_dedup)?;
    registry.register("project", refiners::project)?;
    registry.register("rename_fields", refiners::rename_fields)?;
    Ok(())
}

/// A fresh registry pre-populated with the built-in catalog.
pub fn builtin_registry() -> OperatorRegistry {
    let registry = OperatorRegistry::new();
    register_builtins(&registry)
        .unwrap_or_else(|e| unreachable!("builtin registration on a fresh registry: {e}"));
    registry
}

pub(crate) fn require_str(params: &serde_json::Value, key: &str) -> Result<String, OperatorError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| OperatorError::InvalidParams(format!("missing string parameter '{key}'")))
}

pub(crate) fn require_f64(params: &serde_json::Value, key: &str) -> Result<f64, OperatorError> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| OperatorError::InvalidParams(format!("missing numeric parameter '{key}'")))
}

pub(crate) fn require_string_list(
    params: &serde_json::Value,
    key: &str,
) -> Result<Vec<String>, OperatorError> {
    let items = params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| OperatorError::InvalidParams(format!("missing list parameter '{key}'")))?;
    let list: Option<Vec<String>> = items
        .iter()
        .map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    list.filter(|l| !l.is_empty())
        .ok_or_else(|| OperatorError::InvalidParams(format!("'{key}' must be a non-empty list of strings")))
}
