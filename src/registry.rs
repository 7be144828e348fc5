//! Component registry: named factories scoped by component kind
//!
//! Each scope (dataset, model, metric, task) maps a string key to a factory
//! that builds a boxed component from free-form [`Params`]. Registration
//! happens once at startup; afterwards the registry is only read.
//!
//! Registries are explicit values rather than process globals, so every test
//! can start from a fresh [`ComponentRegistry`].
//!
//! # Example
//!
//! ```rust
//! use trueno_eval::registry::{ComponentKind, ComponentRegistry};
//!
//! let registry = ComponentRegistry::with_builtins()?;
//! assert!(registry.keys(ComponentKind::Metric).contains(&"accuracy".to_string()));
//! # Ok::<(), trueno_eval::Error>(())
//! ```

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{self, Dataset};
use crate::metric::{self, Metric};
use crate::model::{self, ModelAdapter};
use crate::task::{self, Task};
use crate::types::Params;
use crate::{Error, Result};

/// The four registry scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Example sources
    Dataset,
    /// Model adapters
    Model,
    /// Aggregate metrics
    Metric,
    /// Problem classes binding datasets to metric sets
    Task,
}

impl ComponentKind {
    /// All kinds, in registry order.
    pub const ALL: [Self; 4] = [Self::Dataset, Self::Model, Self::Metric, Self::Task];

    /// Lowercase name used in messages and JSON.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Model => "model",
            Self::Metric => "metric",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Factory building one component from its parameters.
pub type Factory<T> = Box<dyn Fn(&Params) -> Result<Box<T>> + Send + Sync>;

/// A single registry scope.
pub struct Registry<T: ?Sized> {
    kind: ComponentKind,
    entries: DashMap<String, Factory<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty scope.
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    /// The kind this scope holds.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Register a factory under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if `key` is already registered in this
    /// scope. The existing entry is left untouched.
    pub fn register<F>(&self, key: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&Params) -> Result<Box<T>> + Send + Sync + 'static,
    {
        let key = key.into();
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Err(Error::DuplicateKey {
                kind: self.kind,
                key: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                debug!(kind = %self.kind, key = %entry.key(), "Registering component");
                entry.insert(Box::new(factory));
                Ok(())
            }
        }
    }

    /// Build the component registered under `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownComponent`] if `key` is not registered
    /// - [`Error::ComponentConstruction`] wrapping whatever the factory returned
    pub fn resolve(&self, key: &str, params: &Params) -> Result<Box<T>> {
        let factory = self.entries.get(key).ok_or_else(|| Error::UnknownComponent {
            kind: self.kind,
            key: key.to_string(),
            available: self.available(),
        })?;

        (factory.value())(params).map_err(|source| Error::ComponentConstruction {
            kind: self.kind,
            key: key.to_string(),
            source: Box::new(source),
        })
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn available(&self) -> String {
        let keys = self.keys();
        if keys.is_empty() {
            "<empty>".to_string()
        } else {
            keys.join(", ")
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("keys", &self.keys())
            .finish()
    }
}

/// All four registry scopes.
#[derive(Debug)]
pub struct ComponentRegistry {
    datasets: Registry<dyn Dataset>,
    models: Registry<dyn ModelAdapter>,
    metrics: Registry<dyn Metric>,
    tasks: Registry<dyn Task>,
}

impl ComponentRegistry {
    /// Create a registry with every scope empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            datasets: Registry::new(ComponentKind::Dataset),
            models: Registry::new(ComponentKind::Model),
            metrics: Registry::new(ComponentKind::Metric),
            tasks: Registry::new(ComponentKind::Task),
        }
    }

    /// Create a registry pre-populated with the built-in components.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in key were registered twice.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        dataset::register_builtins(&registry.datasets)?;
        model::register_builtins(&registry.models)?;
        metric::register_builtins(&registry.metrics)?;
        task::register_builtins(&registry.tasks)?;
        Ok(registry)
    }

    /// Dataset scope.
    #[must_use]
    pub const fn datasets(&self) -> &Registry<dyn Dataset> {
        &self.datasets
    }

    /// Model adapter scope.
    #[must_use]
    pub const fn models(&self) -> &Registry<dyn ModelAdapter> {
        &self.models
    }

    /// Metric scope.
    #[must_use]
    pub const fn metrics(&self) -> &Registry<dyn Metric> {
        &self.metrics
    }

    /// Task scope.
    #[must_use]
    pub const fn tasks(&self) -> &Registry<dyn Task> {
        &self.tasks
    }

    /// Sorted keys registered under `kind`.
    #[must_use]
    pub fn keys(&self, kind: ComponentKind) -> Vec<String> {
        match kind {
            ComponentKind::Dataset => self.datasets.keys(),
            ComponentKind::Model => self.models.keys(),
            ComponentKind::Metric => self.metrics.keys(),
            ComponentKind::Task => self.tasks.keys(),
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize free-form parameters into a component's typed parameter struct.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] naming the component when the parameters
/// do not match `P`.
pub fn parse_params<P: DeserializeOwned>(component: &str, params: &Params) -> Result<P> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| Error::InvalidConfig(format!("invalid parameters for '{component}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(params: &Params) -> Result<Box<String>> {
        Ok(Box::new(
            params
                .get("label")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("default")
                .to_string(),
        ))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry: Registry<String> = Registry::new(ComponentKind::Model);
        registry.register("echo", label).unwrap();

        let mut params = Params::new();
        params.insert("label".into(), "pos".into());

        assert_eq!(*registry.resolve("echo", &params).unwrap(), "pos");
        assert_eq!(*registry.resolve("echo", &Params::new()).unwrap(), "default");
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let registry: Registry<String> = Registry::new(ComponentKind::Metric);
        registry.register("accuracy", label).unwrap();

        let err = registry.register("accuracy", label).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateKey { kind: ComponentKind::Metric, ref key } if key == "accuracy"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_key_in_different_kinds() {
        let registry = ComponentRegistry::new();
        registry
            .datasets()
            .register("inline", |_: &Params| -> Result<Box<dyn Dataset>> {
                Ok(Box::new(crate::dataset::InlineDataset::default()))
            })
            .unwrap();
        registry
            .models()
            .register("inline", |_: &Params| -> Result<Box<dyn ModelAdapter>> {
                Ok(Box::new(crate::model::KeywordMatchingModel::new(&[], &[])))
            })
            .unwrap();

        assert_eq!(registry.keys(ComponentKind::Dataset), vec!["inline"]);
        assert_eq!(registry.keys(ComponentKind::Model), vec!["inline"]);
        assert!(registry.metrics().is_empty());
    }

    #[test]
    fn test_unknown_key_lists_available() {
        let registry: Registry<String> = Registry::new(ComponentKind::Dataset);
        registry.register("b", label).unwrap();
        registry.register("a", label).unwrap();

        let err = registry.resolve("missing", &Params::new()).unwrap_err();
        match err {
            Error::UnknownComponent { available, .. } => assert_eq!(available, "a, b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_key_in_empty_scope() {
        let registry: Registry<String> = Registry::new(ComponentKind::Task);
        let err = registry.resolve("x", &Params::new()).unwrap_err();
        assert!(err.to_string().contains("<empty>"));
    }

    #[test]
    fn test_construction_error_is_wrapped() {
        let registry: Registry<String> = Registry::new(ComponentKind::Model);
        registry
            .register("broken", |_: &Params| -> Result<Box<String>> {
                Err(Error::InvalidConfig("missing artifact".into()))
            })
            .unwrap();

        let err = registry.resolve("broken", &Params::new()).unwrap_err();
        match err {
            Error::ComponentConstruction { kind, key, source } => {
                assert_eq!(kind, ComponentKind::Model);
                assert_eq!(key, "broken");
                assert!(source.to_string().contains("missing artifact"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_keys_are_sorted() {
        let registry: Registry<String> = Registry::new(ComponentKind::Metric);
        for key in ["f1", "accuracy", "bleu"] {
            registry.register(key, label).unwrap();
        }
        assert_eq!(registry.keys(), vec!["accuracy", "bleu", "f1"]);
    }

    #[test]
    fn test_builtins_cover_every_kind() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        for kind in ComponentKind::ALL {
            assert!(!registry.keys(kind).is_empty(), "no builtins for {kind}");
        }
        assert!(registry.datasets().contains("jsonl-classification"));
        assert!(registry.models().contains("keyword-matching"));
        assert!(registry.tasks().contains("text-classification"));
    }

    #[test]
    fn test_component_kind_display() {
        assert_eq!(ComponentKind::Dataset.to_string(), "dataset");
        assert_eq!(
            serde_json::to_string(&ComponentKind::Metric).unwrap(),
            "\"metric\""
        );
    }
}
