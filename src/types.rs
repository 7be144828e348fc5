//! Core records shared by datasets, models, metrics and runs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form component parameters, as written in the config file.
pub type Params = serde_json::Map<String, Value>;

/// One labeled input unit from a dataset.
///
/// Immutable once loaded. `uid` is unique within its dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Unique identifier within the dataset
    pub uid: String,
    /// Named model inputs (e.g. `text`, `question`)
    pub inputs: Params,
    /// Gold output; `null` means "undefined" and is skipped by label metrics
    pub expected_output: Value,
    /// Extra dataset fields not consumed as inputs
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Params,
}

impl Example {
    /// Create an example with a single `text` input.
    #[must_use]
    pub fn text(uid: impl Into<String>, text: impl Into<String>, expected: Value) -> Self {
        let mut inputs = Params::new();
        inputs.insert("text".to_string(), Value::String(text.into()));
        Self {
            uid: uid.into(),
            inputs,
            expected_output: expected,
            metadata: Params::new(),
        }
    }

    /// Primary text input, if present.
    #[must_use]
    pub fn input_text(&self) -> Option<&str> {
        self.inputs.get("text").and_then(Value::as_str)
    }

    /// Whether the gold output is defined.
    #[must_use]
    pub fn has_expected(&self) -> bool {
        !self.expected_output.is_null()
    }
}

/// Raw output of a model adapter for one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Predicted output
    pub output: Value,
    /// Adapter-specific detail (probabilities, matched keyword, ...)
    #[serde(default)]
    pub metadata: Params,
}

impl ModelResponse {
    /// Response with no metadata.
    #[must_use]
    pub fn new(output: Value) -> Self {
        Self {
            output,
            metadata: Params::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Model output for one example, joined with the example it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Uid of the example this prediction answers
    pub uid: String,
    /// Inputs given to the model
    #[serde(default)]
    pub inputs: Params,
    /// Gold output of the example
    #[serde(default)]
    pub expected_output: Value,
    /// Model output; `null` when the adapter failed
    pub predicted_output: Value,
    /// Adapter metadata; carries `error` when the adapter failed
    #[serde(default)]
    pub metadata: Params,
}

impl Prediction {
    /// Join an example with a successful model response.
    #[must_use]
    pub fn from_response(example: &Example, response: ModelResponse) -> Self {
        Self {
            uid: example.uid.clone(),
            inputs: example.inputs.clone(),
            expected_output: example.expected_output.clone(),
            predicted_output: response.output,
            metadata: response.metadata,
        }
    }

    /// Record a failed prediction: `null` output with `metadata.error` set.
    #[must_use]
    pub fn failed(example: &Example, error: &str) -> Self {
        let mut metadata = Params::new();
        metadata.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            uid: example.uid.clone(),
            inputs: example.inputs.clone(),
            expected_output: example.expected_output.clone(),
            predicted_output: Value::Null,
            metadata,
        }
    }

    /// Adapter error message, if this prediction failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.metadata.get("error").and_then(Value::as_str)
    }
}

/// Outcome of one metric computation.
///
/// `value` is the scalar headline; `details` carries payloads that do not
/// reduce to a scalar (confusion matrix, per-label counts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Metric result name (unique within a run)
    pub name: String,
    /// Headline value (`NaN` when undefined)
    #[serde(with = "nan_as_null")]
    pub value: f64,
    /// Structured payload
    #[serde(default)]
    pub details: Params,
}

impl MetricResult {
    /// Create a result with empty details.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            details: Params::new(),
        }
    }

    /// Attach a details entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Display name of an output value.
///
/// Strings render verbatim; every other value (including `null`) renders as
/// its compact JSON text. The mapping is not injective (`"1"` and `1` both
/// render as `1`), so label identity is the JSON value itself.
#[must_use]
pub fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON has no NaN; undefined metric values round-trip through `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
