//! Declarative run configuration
//!
//! A run is described by a JSON document naming a task, a dataset, a model
//! and a metric list, each with free-form parameters:
//!
//! ```json
//! {
//!   "name": "sentiment-smoke",
//!   "task": "text-classification",
//!   "dataset": {"type": "jsonl-classification", "parameters": {"path": "data/sentiment.jsonl"}},
//!   "model": {"type": "keyword-matching", "parameters": {"positive_keywords": ["great"]}},
//!   "metrics": ["accuracy", {"type": "f1", "parameters": {"average": "weighted"}}],
//!   "output": {"directory": "runs", "save_predictions": true}
//! }
//! ```
//!
//! [`resolve_config`] loads such a file and anchors every path-like
//! parameter at the config file's directory, so a config can be run from any
//! working directory.

mod catalog;
mod resolver;

pub use catalog::{ConfigCatalog, ConfigInfo};
pub use resolver::{ConfigResolver, ResolvedEvaluation};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::Params;
use crate::{Error, Result};

/// Config name used when a spec was not loaded from a file.
pub const ADHOC_CONFIG_NAME: &str = "adhoc";

/// A component reference: registry key plus constructor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Registry key
    #[serde(rename = "type")]
    pub kind: String,
    /// Constructor parameters
    #[serde(default)]
    pub parameters: Params,
}

impl ComponentSpec {
    /// Component with no parameters.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameters: Params::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// The task reference: a bare key or `{type, parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TaskEntry")]
pub struct TaskSpec {
    /// Registry key
    #[serde(rename = "type")]
    pub kind: String,
    /// Task parameters (e.g. `batch_size`)
    #[serde(default)]
    pub parameters: Params,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskEntry {
    Key(String),
    Spec {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        parameters: Params,
    },
}

impl From<TaskEntry> for TaskSpec {
    fn from(entry: TaskEntry) -> Self {
        match entry {
            TaskEntry::Key(kind) => Self {
                kind,
                parameters: Params::new(),
            },
            TaskEntry::Spec { kind, parameters } => Self { kind, parameters },
        }
    }
}

/// A metric entry: a bare key or `{type, name?, parameters?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MetricEntry")]
pub struct MetricSpec {
    /// Registry key
    #[serde(rename = "type")]
    pub kind: String,
    /// Result name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Metric parameters (e.g. `average`)
    #[serde(default)]
    pub parameters: Params,
}

impl MetricSpec {
    /// Metric with default name and parameters.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            parameters: Params::new(),
        }
    }

    /// Override the result name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricEntry {
    Key(String),
    Spec {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        parameters: Params,
    },
}

impl From<MetricEntry> for MetricSpec {
    fn from(entry: MetricEntry) -> Self {
        match entry {
            MetricEntry::Key(kind) => Self::new(kind),
            MetricEntry::Spec {
                kind,
                name,
                parameters,
            } => Self {
                kind,
                name,
                parameters,
            },
        }
    }
}

/// Where and what to write after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Directory for the JSON run artifact; no artifact when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Whether predictions are kept on the run
    #[serde(default = "default_true")]
    pub save_predictions: bool,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            directory: None,
            save_predictions: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// A complete, ready-to-resolve run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpec {
    /// Run name; derived from `config_name` and the start time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Task reference
    pub task: TaskSpec,
    /// Dataset reference
    pub dataset: ComponentSpec,
    /// Model reference
    pub model: ComponentSpec,
    /// Metrics; empty means the task's defaults
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
    /// Artifact settings
    #[serde(default)]
    pub output: OutputSpec,
    /// Short config identifier (file stem or preset name)
    #[serde(default = "adhoc_config_name")]
    pub config_name: String,
    /// Canonical path of the config file, if loaded from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

fn adhoc_config_name() -> String {
    ADHOC_CONFIG_NAME.to_string()
}

impl ConfigSpec {
    /// Programmatic spec with no metrics (task defaults) and no artifact.
    #[must_use]
    pub fn new(task: impl Into<String>, dataset: ComponentSpec, model: ComponentSpec) -> Self {
        Self {
            name: None,
            task: TaskSpec {
                kind: task.into(),
                parameters: Params::new(),
            },
            dataset,
            model,
            metrics: Vec::new(),
            output: OutputSpec::default(),
            config_name: adhoc_config_name(),
            config_path: None,
        }
    }

    /// Set the run name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a metric.
    #[must_use]
    pub fn with_metric(mut self, metric: MetricSpec) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Write a run artifact into `directory`.
    #[must_use]
    pub fn with_output_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output.directory = Some(directory.into());
        self
    }

    /// Parse a JSON config document.
    ///
    /// When `base_dir` is given, relative path-like parameters are resolved
    /// against it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the document does not describe a run.
    pub fn parse(text: &str, base_dir: Option<&Path>) -> Result<Self> {
        let mut spec: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("malformed config document: {e}")))?;
        if let Some(base_dir) = base_dir {
            spec.anchor_paths(base_dir);
        }
        Ok(spec)
    }

    /// Resolve relative path-like dataset/model parameters and the output
    /// directory against `base_dir`.
    pub fn anchor_paths(&mut self, base_dir: &Path) {
        resolve_parameter_paths(&mut self.dataset.parameters, base_dir);
        resolve_parameter_paths(&mut self.model.parameters, base_dir);
        if let Some(directory) = self.output.directory.take() {
            self.output.directory = Some(resolve_path(&directory, base_dir));
        }
    }

    /// The configured run name, or one derived from `config_name` and `at`.
    #[must_use]
    pub fn run_name(&self, at: DateTime<Utc>) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| derive_run_name(&self.config_name, at))
    }
}

/// Load and anchor a config file.
///
/// `config_name` becomes the file stem and `config_path` the canonical path.
///
/// # Errors
///
/// - [`Error::ConfigNotFound`] if the file does not exist
/// - [`Error::Io`] if it cannot be read
/// - [`Error::InvalidConfig`] if it is not a valid config document
pub fn resolve_config(path: impl AsRef<Path>) -> Result<ConfigSpec> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::ConfigNotFound(path.display().to_string()));
    }
    let canonical = path.canonicalize()?;
    let text = std::fs::read_to_string(&canonical)?;
    let base_dir = canonical.parent().unwrap_or_else(|| Path::new("."));

    let mut spec = ConfigSpec::parse(&text, Some(base_dir))?;
    spec.config_name = canonical
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map_or_else(adhoc_config_name, ToString::to_string);
    spec.config_path = Some(canonical.clone());

    debug!(config = %spec.config_name, path = %canonical.display(), "Loaded config");
    Ok(spec)
}

/// `<config_name>-<UTC timestamp with microseconds>`.
#[must_use]
pub fn derive_run_name(config_name: &str, at: DateTime<Utc>) -> String {
    format!("{config_name}-{}", at.format("%Y%m%dT%H%M%S%.6fZ"))
}

fn is_path_key(key: &str) -> bool {
    key == "path" || key == "directory" || key.ends_with("_path") || key.ends_with("_dir")
}

fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn resolve_parameter_paths(parameters: &mut Params, base_dir: &Path) {
    for (key, value) in parameters.iter_mut() {
        if !is_path_key(key) {
            continue;
        }
        if let Value::String(raw) = value {
            let resolved = resolve_path(Path::new(raw.as_str()), base_dir);
            *value = Value::String(resolved.to_string_lossy().into_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const CONFIG: &str = r#"{
        "task": "text-classification",
        "dataset": {"type": "jsonl-classification", "parameters": {"path": "data/a.jsonl"}},
        "model": {"type": "keyword-matching", "parameters": {"weights_path": "/abs/w.bin", "label": "x"}},
        "metrics": ["accuracy", {"type": "f1", "name": "f1_w", "parameters": {"average": "weighted"}}],
        "output": {"directory": "runs"}
    }"#;

    #[test]
    fn test_parse_mixed_metric_entries() {
        let spec = ConfigSpec::parse(CONFIG, None).unwrap();
        assert_eq!(spec.task.kind, "text-classification");
        assert_eq!(spec.metrics.len(), 2);
        assert_eq!(spec.metrics[0], MetricSpec::new("accuracy"));
        assert_eq!(spec.metrics[1].name.as_deref(), Some("f1_w"));
        assert_eq!(spec.metrics[1].parameters["average"], json!("weighted"));
        assert!(spec.output.save_predictions);
        assert_eq!(spec.config_name, ADHOC_CONFIG_NAME);
    }

    #[test]
    fn test_task_object_form() {
        let text = CONFIG.replace(
            "\"task\": \"text-classification\"",
            "\"task\": {\"type\": \"retrieval-qa\", \"parameters\": {\"batch_size\": 4}}",
        );
        let spec = ConfigSpec::parse(&text, None).unwrap();
        assert_eq!(spec.task.kind, "retrieval-qa");
        assert_eq!(spec.task.parameters["batch_size"], json!(4));
    }

    #[test]
    fn test_paths_are_anchored_at_base_dir() {
        let spec = ConfigSpec::parse(CONFIG, Some(Path::new("/configs"))).unwrap();
        assert_eq!(spec.dataset.parameters["path"], json!("/configs/data/a.jsonl"));
        assert_eq!(spec.model.parameters["weights_path"], json!("/abs/w.bin"));
        assert_eq!(spec.model.parameters["label"], json!("x"));
        assert_eq!(spec.output.directory, Some(PathBuf::from("/configs/runs")));
    }

    #[test]
    fn test_malformed_document() {
        let err = ConfigSpec::parse(r#"{"task": "x"}"#, None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_path_key_convention() {
        assert!(is_path_key("path"));
        assert!(is_path_key("directory"));
        assert!(is_path_key("contexts_path"));
        assert!(is_path_key("cache_dir"));
        assert!(!is_path_key("pathological"));
    }

    #[test]
    fn test_run_name_derivation() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(derive_run_name("sentiment", at), "sentiment-20240506T070809.000000Z");

        let spec = ConfigSpec::new("t", ComponentSpec::new("d"), ComponentSpec::new("m"));
        assert_eq!(spec.run_name(at), "adhoc-20240506T070809.000000Z");
        assert_eq!(spec.with_name("fixed").run_name(at), "fixed");
    }

    #[test]
    fn test_resolve_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentiment_keyword.json");
        std::fs::write(&path, CONFIG).unwrap();

        let spec = resolve_config(&path).unwrap();
        let canonical_dir = dir.path().canonicalize().unwrap();
        assert_eq!(spec.config_name, "sentiment_keyword");
        assert_eq!(spec.config_path, Some(canonical_dir.join("sentiment_keyword.json")));
        assert_eq!(
            spec.dataset.parameters["path"],
            json!(canonical_dir.join("data/a.jsonl").to_string_lossy())
        );
    }

    #[test]
    fn test_resolve_missing_config() {
        let err = resolve_config("/nonexistent/config.json").unwrap_err();
        assert!(err.is_not_found());
    }
}
