//! Turn a [`ConfigSpec`] into live components

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use super::ConfigSpec;
use crate::dataset::Dataset;
use crate::metric::Metric;
use crate::model::ModelAdapter;
use crate::registry::ComponentRegistry;
use crate::task::Task;
use crate::{Error, Result};

/// Components built for one run. Owned by the caller for the run's duration.
pub struct ResolvedEvaluation {
    /// Task governing batching and accepted metrics
    pub task: Box<dyn Task>,
    /// Example source (consumed by the run)
    pub dataset: Box<dyn Dataset>,
    /// Model under evaluation
    pub model: Box<dyn ModelAdapter>,
    /// Metrics, in config order
    pub metrics: Vec<Box<dyn Metric>>,
}

impl std::fmt::Debug for ResolvedEvaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedEvaluation")
            .field("task", &self.task.name())
            .field("model", &self.model.name())
            .field(
                "metrics",
                &self.metrics.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Builds components from a registry.
///
/// Validation happens before construction: an unknown task, a dataset the
/// task does not accept, or a metric outside the task's set fails without
/// building anything.
#[derive(Debug, Clone, Copy)]
pub struct ConfigResolver<'a> {
    registry: &'a ComponentRegistry,
}

impl<'a> ConfigResolver<'a> {
    /// Resolver backed by `registry`.
    #[must_use]
    pub const fn new(registry: &'a ComponentRegistry) -> Self {
        Self { registry }
    }

    /// Resolve every component of `spec`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownComponent`] / [`Error::ComponentConstruction`] from the registry
    /// - [`Error::InvalidConfig`] if the task rejects the dataset type or two
    ///   metrics share a result name
    /// - [`Error::InvalidMetric`] if a metric is outside the task's accepted set
    pub fn resolve(&self, spec: &ConfigSpec) -> Result<ResolvedEvaluation> {
        let task = self
            .registry
            .tasks()
            .resolve(&spec.task.kind, &spec.task.parameters)?;

        if !task.accepts_dataset(&spec.dataset.kind) {
            return Err(Error::InvalidConfig(format!(
                "dataset type '{}' is not supported by task '{}'. Accepted: {}",
                spec.dataset.kind,
                spec.task.kind,
                task.dataset_types().join(", ")
            )));
        }

        let metric_specs = if spec.metrics.is_empty() {
            task.default_metrics()
                .iter()
                .map(super::MetricSpec::new)
                .collect()
        } else {
            spec.metrics.clone()
        };
        for metric in &metric_specs {
            if !task.accepts_metric(&metric.kind) {
                return Err(Error::InvalidMetric {
                    metric: metric.kind.clone(),
                    task: spec.task.kind.clone(),
                    accepted: task.metric_types().join(", "),
                });
            }
        }

        let dataset = self
            .registry
            .datasets()
            .resolve(&spec.dataset.kind, &spec.dataset.parameters)?;
        let model = self
            .registry
            .models()
            .resolve(&spec.model.kind, &spec.model.parameters)?;

        let mut metrics = Vec::with_capacity(metric_specs.len());
        let mut names = BTreeSet::new();
        for metric_spec in metric_specs {
            let mut parameters = metric_spec.parameters;
            if let Some(name) = metric_spec.name {
                parameters.insert("name".to_string(), Value::String(name));
            }
            let metric = self
                .registry
                .metrics()
                .resolve(&metric_spec.kind, &parameters)?;
            if !names.insert(metric.name().to_string()) {
                return Err(Error::InvalidConfig(format!(
                    "metric name '{}' is used more than once; set a distinct 'name'",
                    metric.name()
                )));
            }
            metrics.push(metric);
        }

        debug!(
            task = %spec.task.kind,
            dataset = %spec.dataset.kind,
            model = %spec.model.kind,
            metrics = metrics.len(),
            "Resolved evaluation components"
        );

        Ok(ResolvedEvaluation {
            task,
            dataset,
            model,
            metrics,
        })
    }
}
