//! Run orchestration
//!
//! One evaluation, end to end:
//!
//! 1. resolve components ([`ConfigResolver`])
//! 2. warm the model up
//! 3. stream examples through the model in task-sized batches; a failing
//!    example becomes a failed [`Prediction`] and the run continues
//! 4. compute every metric over the full prediction list; any metric error
//!    aborts the run
//! 5. stamp timings, optionally write the JSON artifact, return the [`Run`]
//!
//! Everything runs on the calling thread. Concurrent runs each resolve their
//! own components, so nothing here is shared or locked.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::write_run_artifact;
use crate::config::{ConfigResolver, ConfigSpec, ResolvedEvaluation};
use crate::model::ModelAdapter;
use crate::registry::ComponentRegistry;
use crate::store::RunStore;
use crate::types::{Example, MetricResult, Prediction};
use crate::{Error, Result};

/// One complete evaluation.
///
/// `id` is `None` until a [`RunStore`] persists the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Store-assigned id
    #[serde(default)]
    pub id: Option<i64>,
    /// Run name
    pub name: String,
    /// Task key
    pub task: String,
    /// Config identifier
    pub config_name: String,
    /// Config file, if the run came from one
    #[serde(default)]
    pub config_path: Option<String>,
    /// Start of the run (UTC)
    pub started_at: DateTime<Utc>,
    /// End of metric computation (UTC)
    pub completed_at: DateTime<Utc>,
    /// `completed_at - started_at` in seconds
    pub duration: f64,
    /// Metric results, in config order
    pub metrics: Vec<MetricResult>,
    /// Per-example predictions; empty when not requested
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    /// JSON artifact written for this run
    #[serde(default)]
    pub artifact_path: Option<String>,
}

impl Run {
    /// Metric result by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.iter().find(|metric| metric.name == name)
    }

    /// Predictions whose model call failed.
    pub fn failed_predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.predictions.iter().filter(|p| p.error().is_some())
    }
}

/// Drives evaluations against a component registry.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    registry: &'a ComponentRegistry,
}

impl<'a> Evaluator<'a> {
    /// Evaluator resolving components from `registry`.
    #[must_use]
    pub const fn new(registry: &'a ComponentRegistry) -> Self {
        Self { registry }
    }

    /// Resolve and execute `spec`.
    ///
    /// `save_predictions` overrides `spec.output.save_predictions` when set.
    ///
    /// # Errors
    ///
    /// Resolution errors, fatal dataset errors (unreadable source, malformed
    /// record, duplicate uid), warmup failures, [`Error::MetricComputation`],
    /// and artifact I/O errors. Per-example model failures are not errors.
    pub fn run(&self, spec: &ConfigSpec, save_predictions: Option<bool>) -> Result<Run> {
        let resolved = ConfigResolver::new(self.registry).resolve(spec)?;
        Self::execute(
            spec,
            resolved,
            save_predictions.unwrap_or(spec.output.save_predictions),
        )
    }

    /// Run `spec` and persist the result; nothing is stored if the run fails.
    ///
    /// # Errors
    ///
    /// See [`Self::run`] and [`RunStore::save`].
    pub fn run_and_save(
        &self,
        spec: &ConfigSpec,
        save_predictions: Option<bool>,
        store: &dyn RunStore,
    ) -> Result<Run> {
        let run = self.run(spec, save_predictions)?;
        store.save(run)
    }

    /// Execute already-resolved components.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub fn execute(
        spec: &ConfigSpec,
        resolved: ResolvedEvaluation,
        save_predictions: bool,
    ) -> Result<Run> {
        let ResolvedEvaluation {
            task,
            dataset,
            mut model,
            metrics,
        } = resolved;

        let started_at = Utc::now();
        let name = spec.run_name(started_at);
        info!(
            run = %name,
            task = %spec.task.kind,
            model = %model.name(),
            "Starting evaluation"
        );

        model.warmup()?;

        let batch_size = task.batch_size().max(1);
        let mut examples = Vec::new();
        let mut predictions = Vec::new();
        let mut seen = HashSet::new();
        let mut batch = Vec::with_capacity(batch_size);

        for example in dataset.into_examples()? {
            let example = example?;
            if !seen.insert(example.uid.clone()) {
                return Err(Error::Dataset(format!(
                    "duplicate example uid '{}'",
                    example.uid
                )));
            }
            batch.push(example);
            if batch.len() >= batch_size {
                predict_batch(model.as_ref(), &mut batch, &mut examples, &mut predictions);
            }
        }
        if !batch.is_empty() {
            predict_batch(model.as_ref(), &mut batch, &mut examples, &mut predictions);
        }

        let mut results = Vec::with_capacity(metrics.len());
        for metric in &metrics {
            let result = metric.compute(&examples, &predictions).map_err(|source| {
                Error::MetricComputation {
                    metric: metric.name().to_string(),
                    source: Box::new(source),
                }
            })?;
            results.push(result);
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at)
            .to_std()
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());
        let failed = predictions.iter().filter(|p| p.error().is_some()).count();

        let mut run = Run {
            id: None,
            name,
            task: spec.task.kind.clone(),
            config_name: spec.config_name.clone(),
            config_path: spec
                .config_path
                .as_ref()
                .map(|path| path.display().to_string()),
            started_at,
            completed_at,
            duration,
            metrics: results,
            predictions: if save_predictions {
                predictions
            } else {
                Vec::new()
            },
            artifact_path: None,
        };

        if let Some(directory) = &spec.output.directory {
            let path = write_run_artifact(directory, &run)?;
            run.artifact_path = Some(path.display().to_string());
        }

        info!(
            run = %run.name,
            examples = examples.len(),
            failed,
            duration_s = run.duration,
            "Completed evaluation"
        );
        Ok(run)
    }
}

/// Predict `batch`, draining it into `examples` / `predictions`.
///
/// Adapter errors, and missing results from a short batch response, become
/// failed predictions.
fn predict_batch(
    model: &dyn ModelAdapter,
    batch: &mut Vec<Example>,
    examples: &mut Vec<Example>,
    predictions: &mut Vec<Prediction>,
) {
    let mut responses = model.predict_batch(batch).into_iter();
    for example in batch.drain(..) {
        let prediction = match responses.next() {
            Some(Ok(response)) => Prediction::from_response(&example, response),
            Some(Err(err)) => {
                let message = match err {
                    Error::Prediction { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(uid = %example.uid, error = %message, "Prediction failed");
                Prediction::failed(&example, &message)
            }
            None => {
                warn!(uid = %example.uid, "Model returned no prediction");
                Prediction::failed(&example, "model returned no prediction for this example")
            }
        };
        examples.push(example);
        predictions.push(prediction);
    }
}

/// Resolve and run `spec` with a fresh [`Evaluator`].
///
/// `save_predictions: None` keeps the config's `output.save_predictions`.
///
/// # Errors
///
/// See [`Evaluator::run`].
pub fn run_evaluation(
    registry: &ComponentRegistry,
    spec: &ConfigSpec,
    save_predictions: Option<bool>,
) -> Result<Run> {
    Evaluator::new(registry).run(spec, save_predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComponentSpec, MetricSpec};
    use crate::dataset::InlineDataset;
    use crate::metric::{Accuracy, Metric};
    use crate::task::TaskDefinition;
    use crate::types::ModelResponse;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn inline(examples: serde_json::Value) -> ComponentSpec {
        ComponentSpec::new("inline").with_param("examples", examples)
    }

    fn keyword_model() -> ComponentSpec {
        ComponentSpec::new("keyword-matching")
            .with_param("positive_keywords", json!(["good"]))
            .with_param("negative_keywords", json!(["bad"]))
    }

    /// Echoes `text`; fails until warmed up; counts batch calls.
    struct EchoModel {
        warmed: bool,
        batch_calls: Arc<AtomicUsize>,
        drop_last: bool,
    }

    impl ModelAdapter for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        fn warmup(&mut self) -> Result<()> {
            self.warmed = true;
            Ok(())
        }

        fn predict(&self, example: &Example) -> Result<ModelResponse> {
            if !self.warmed {
                return Err(Error::Prediction {
                    uid: example.uid.clone(),
                    reason: "not warmed up".into(),
                });
            }
            Ok(ModelResponse::new(example.inputs["text"].clone()))
        }

        fn predict_batch(&self, examples: &[Example]) -> Vec<Result<ModelResponse>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            let mut out: Vec<_> = examples.iter().map(|e| self.predict(e)).collect();
            if self.drop_last {
                out.pop();
            }
            out
        }
    }

    fn echo_evaluation(
        examples: Vec<Example>,
        batch_size: usize,
        drop_last: bool,
    ) -> (ResolvedEvaluation, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolved = ResolvedEvaluation {
            task: Box::new(TaskDefinition::new("echo").with_batch_size(batch_size)),
            dataset: Box::new(InlineDataset::new(examples)),
            model: Box::new(EchoModel {
                warmed: false,
                batch_calls: Arc::clone(&calls),
                drop_last,
            }),
            metrics: vec![Box::new(Accuracy::new("accuracy"))],
        };
        (resolved, calls)
    }

    fn texts(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| Example::text(format!("e{i}"), format!("t{i}"), json!(format!("t{i}"))))
            .collect()
    }

    fn adhoc_spec() -> ConfigSpec {
        ConfigSpec::new("echo", ComponentSpec::new("inline"), ComponentSpec::new("echo"))
    }

    #[test]
    fn test_warmup_runs_before_predictions() {
        let (resolved, _) = echo_evaluation(texts(3), 1, false);
        let run = Evaluator::execute(&adhoc_spec(), resolved, true).unwrap();
        assert_eq!(run.failed_predictions().count(), 0);
        assert!((run.metric("accuracy").unwrap().value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_examples_are_batched_by_task() {
        let (resolved, calls) = echo_evaluation(texts(5), 2, false);
        let run = Evaluator::execute(&adhoc_spec(), resolved, true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let uids: Vec<&str> = run.predictions.iter().map(|p| p.uid.as_str()).collect();
        assert_eq!(uids, ["e0", "e1", "e2", "e3", "e4"]);
    }

    #[test]
    fn test_short_batch_response_becomes_failures() {
        let (resolved, _) = echo_evaluation(texts(4), 2, true);
        let run = Evaluator::execute(&adhoc_spec(), resolved, true).unwrap();
        assert_eq!(run.predictions.len(), 4);
        let failed: Vec<&str> = run.failed_predictions().map(|p| p.uid.as_str()).collect();
        assert_eq!(failed, ["e1", "e3"]);
    }

    #[test]
    fn test_duplicate_uid_aborts_run() {
        let mut examples = texts(2);
        examples[1].uid = "e0".into();
        let (resolved, _) = echo_evaluation(examples, 1, false);
        let err = Evaluator::execute(&adhoc_spec(), resolved, true).unwrap_err();
        assert!(matches!(err, Error::Dataset(ref msg) if msg.contains("e0")));
    }

    #[test]
    fn test_failing_metric_aborts_run() {
        struct Broken;
        impl Metric for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn compute(&self, _: &[Example], _: &[Prediction]) -> Result<MetricResult> {
                Err(Error::InvalidConfig("boom".into()))
            }
        }

        let (mut resolved, _) = echo_evaluation(texts(1), 1, false);
        resolved.metrics.push(Box::new(Broken));
        let err = Evaluator::execute(&adhoc_spec(), resolved, true).unwrap_err();
        assert!(matches!(err, Error::MetricComputation { ref metric, .. } if metric == "broken"));
    }

    #[test]
    fn test_failed_example_is_isolated() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        let spec = ConfigSpec::new(
            "text-classification",
            inline(json!([
                {"id": "ok", "text": "good stuff", "label": "positive"},
                {"id": "bad", "inputs": {"text": 7}, "label": "negative"}
            ])),
            keyword_model(),
        )
        .with_metric(MetricSpec::new("accuracy"));

        let run = run_evaluation(&registry, &spec, None).unwrap();
        assert_eq!(run.predictions.len(), 2);
        let failed = &run.predictions[1];
        assert!(failed.predicted_output.is_null());
        assert!(failed.error().unwrap().contains("must be a string"));
        assert!((run.metric("accuracy").unwrap().value - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_predictions_override() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        let spec = ConfigSpec::new(
            "text-classification",
            inline(json!([{"text": "good", "label": "positive"}])),
            keyword_model(),
        );

        let kept = run_evaluation(&registry, &spec, None).unwrap();
        assert_eq!(kept.predictions.len(), 1);

        let dropped = run_evaluation(&registry, &spec, Some(false)).unwrap();
        assert!(dropped.predictions.is_empty());
        assert_eq!(dropped.metrics.len(), 3);
        assert!(dropped.name.starts_with("adhoc-"));
        assert!(dropped.duration >= 0.0);
        assert!(dropped.completed_at >= dropped.started_at);
    }

    #[test]
    fn test_artifact_written_when_output_dir_set() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ComponentRegistry::with_builtins().unwrap();
        let spec = ConfigSpec::new(
            "text-classification",
            inline(json!([{"text": "bad", "label": "negative"}])),
            keyword_model(),
        )
        .with_name("smoke")
        .with_output_dir(dir.path());

        let run = run_evaluation(&registry, &spec, None).unwrap();
        let path = std::path::PathBuf::from(run.artifact_path.unwrap());
        assert!(path.starts_with(dir.path()));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("smoke_"));
    }
}
