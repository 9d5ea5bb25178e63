use crate::{
    error::{OperatorError, RegistryError},
    operator::Operator,
};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tracing::debug;

pub type OperatorConstructor =
    Arc<dyn Fn(&serde_json::Value) -> Result<Operator, OperatorError> + Send + Sync>;

/// Mapping from operator name to constructor, so pipeline spec files can
/// reference operators by string name. Explicitly constructed and passed by
/// reference (tests get a fresh registry each); populated once at startup,
/// read-mostly afterwards.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    inner: Arc<RwLock<HashMap<String, OperatorConstructor>>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`. Constructors are opaque, so an
    /// identical re-registration cannot be told apart from a conflicting
    /// one; every duplicate fails loudly.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F) -> Result<(), RegistryError>
    where
        F: Fn(&serde_json::Value) -> Result<Operator, OperatorError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut map = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if map.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        debug!(operator = %name, "Registered operator");
        map.insert(name, Arc::new(constructor));
        Ok(())
    }

    /// Construct the operator registered under `name` with the given
    /// parameters.
    pub fn resolve(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<Operator, RegistryError> {
        let constructor = {
            let map = self
                .inner
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.get(name)
                .cloned()
                .ok_or_else(|| RegistryError::Unknown(name.to_string()))?
        };
        constructor(params).map_err(|source| RegistryError::Construct {
            name: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{Filter, FilterDecision};
    use model::records::record::Record;

    struct AcceptAll;

    impl Filter for AcceptAll {
        fn evaluate(&self, _record: &Record) -> Result<FilterDecision, OperatorError> {
            Ok(FilterDecision::accept())
        }
    }

    fn accept_all_constructor(_params: &serde_json::Value) -> Result<Operator, OperatorError> {
        Ok(Operator::filter("accept_all", AcceptAll))
    }

    #[test]
    fn resolve_unknown_fails() {
        let registry = OperatorRegistry::new();
        let err = registry
            .resolve("missing", &serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unknown(name) if name == "missing"));
    }

    #[test]
    fn duplicate_registration_fails_loudly() {
        let registry = OperatorRegistry::new();
        registry
            .register("accept_all", accept_all_constructor)
            .unwrap();
        let err = registry
            .register("accept_all", accept_all_constructor)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "accept_all"));
    }

    #[test]
    fn resolves_registered_operator() {
        let registry = OperatorRegistry::new();
        registry
            .register("accept_all", accept_all_constructor)
            .unwrap();
        let operator = registry
            .resolve("accept_all", &serde_json::Value::Null)
            .unwrap();
        assert_eq!(operator.name(), "accept_all");
        assert!(registry.contains("accept_all"));
    }
}
