//! Tasks: problem classes binding dataset types to an accepted metric set
//!
//! A task decides which datasets and metrics make sense together and how
//! examples are fed to the model (one at a time or in batches). The config
//! resolver consults it before building anything.

use serde::Deserialize;

use crate::metric::{CLASSIFICATION_METRICS, GENERATION_METRICS};
use crate::registry::{parse_params, Registry};
use crate::types::Params;
use crate::Result;

/// A problem class.
pub trait Task: Send + Sync {
    /// Registry key of the task.
    fn name(&self) -> &str;

    /// Dataset keys the task accepts; empty means any.
    fn dataset_types(&self) -> &[String];

    /// Metric keys the task accepts.
    fn metric_types(&self) -> &[String];

    /// Metrics used when a config lists none.
    fn default_metrics(&self) -> &[String];

    /// Examples handed to [`crate::model::ModelAdapter::predict_batch`] per call.
    fn batch_size(&self) -> usize {
        1
    }

    /// Whether `dataset` may be used with this task.
    fn accepts_dataset(&self, dataset: &str) -> bool {
        let accepted = self.dataset_types();
        accepted.is_empty() || accepted.iter().any(|key| key == dataset)
    }

    /// Whether `metric` may be used with this task.
    fn accepts_metric(&self, metric: &str) -> bool {
        self.metric_types().iter().any(|key| key == metric)
    }
}

/// Data-driven [`Task`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    name: String,
    dataset_types: Vec<String>,
    metric_types: Vec<String>,
    default_metrics: Vec<String>,
    batch_size: usize,
}

impl TaskDefinition {
    /// Task accepting any dataset and no metrics, sequential prediction.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dataset_types: Vec::new(),
            metric_types: Vec::new(),
            default_metrics: Vec::new(),
            batch_size: 1,
        }
    }

    /// Restrict the accepted datasets.
    #[must_use]
    pub fn with_datasets<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dataset_types = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the accepted metrics.
    #[must_use]
    pub fn with_metrics<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_types = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default metrics.
    #[must_use]
    pub fn with_default_metrics<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_metrics = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the prediction batch size (`0` is treated as `1`).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Built-in `text-classification` task.
    #[must_use]
    pub fn text_classification() -> Self {
        Self::new("text-classification")
            .with_datasets(["jsonl-classification", "inline"])
            .with_metrics(CLASSIFICATION_METRICS)
            .with_default_metrics(["accuracy", "f1", "confusion-matrix"])
    }

    /// Built-in `retrieval-qa` task.
    #[must_use]
    pub fn retrieval_qa() -> Self {
        Self::new("retrieval-qa")
            .with_datasets(["jsonl-rag", "inline"])
            .with_metrics(GENERATION_METRICS.into_iter().chain(["accuracy"]))
            .with_default_metrics(["rouge-l", "bleu"])
    }
}

impl Task for TaskDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn dataset_types(&self) -> &[String] {
        &self.dataset_types
    }

    fn metric_types(&self) -> &[String] {
        &self.metric_types
    }

    fn default_metrics(&self) -> &[String] {
        &self.default_metrics
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrievalParams {
    #[serde(default = "default_batch_size")]
    batch_size: usize,
}

const fn default_batch_size() -> usize {
    1
}

pub(crate) fn register_builtins(registry: &Registry<dyn Task>) -> Result<()> {
    registry.register("text-classification", |params: &Params| {
        let _: NoParams = parse_params("text-classification", params)?;
        Ok(Box::new(TaskDefinition::text_classification()) as Box<dyn Task>)
    })?;
    registry.register("retrieval-qa", |params: &Params| {
        let params: RetrievalParams = parse_params("retrieval-qa", params)?;
        Ok(Box::new(TaskDefinition::retrieval_qa().with_batch_size(params.batch_size)) as Box<dyn Task>)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentKind;
    use serde_json::json;

    fn registry() -> Registry<dyn Task> {
        let registry = Registry::new(ComponentKind::Task);
        register_builtins(&registry).unwrap();
        registry
    }

    #[test]
    fn test_text_classification_accepts_label_metrics_only() {
        let task = TaskDefinition::text_classification();
        assert!(task.accepts_metric("accuracy"));
        assert!(task.accepts_metric("confusion-matrix"));
        assert!(!task.accepts_metric("bleu"));
        assert!(task.accepts_dataset("jsonl-classification"));
        assert!(!task.accepts_dataset("jsonl-rag"));
        assert_eq!(task.batch_size(), 1);
    }

    #[test]
    fn test_default_metrics_are_accepted() {
        for task in [TaskDefinition::text_classification(), TaskDefinition::retrieval_qa()] {
            for metric in task.default_metrics() {
                assert!(task.accepts_metric(metric), "{} rejects {metric}", task.name());
            }
        }
    }

    #[test]
    fn test_empty_dataset_list_accepts_anything() {
        let task = TaskDefinition::new("custom").with_metrics(["accuracy"]);
        assert!(task.accepts_dataset("whatever"));
    }

    #[test]
    fn test_retrieval_qa_batch_size_param() {
        let registry = registry();
        let mut params = Params::new();
        params.insert("batch_size".into(), json!(8));
        let task = registry.resolve("retrieval-qa", &params).unwrap();
        assert_eq!(task.batch_size(), 8);
        assert!(task.accepts_metric("context-precision"));
        assert!(task.accepts_metric("accuracy"));

        params.insert("batch_size".into(), json!(0));
        assert_eq!(registry.resolve("retrieval-qa", &params).unwrap().batch_size(), 1);
    }

    #[test]
    fn test_text_classification_rejects_parameters() {
        let mut params = Params::new();
        params.insert("batch_size".into(), json!(4));
        assert!(registry().resolve("text-classification", &params).is_err());
    }
}
