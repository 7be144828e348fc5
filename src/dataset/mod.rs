//! Datasets: finite, ordered sources of labeled examples
//!
//! A [`Dataset`] is consumed exactly once: [`Dataset::into_examples`] takes
//! the boxed dataset by value and yields a lazy iterator. Re-running an
//! evaluation means resolving a fresh dataset from the registry.
//!
//! Built-in dataset types:
//!
//! | key                    | source                                    |
//! |------------------------|-------------------------------------------|
//! | `jsonl-classification` | JSON Lines with `text`/`input` + `label`  |
//! | `jsonl-rag`            | JSON Lines questions + context store      |
//! | `inline`               | examples embedded in the config itself    |

mod jsonl;
mod rag;

pub use jsonl::JsonlClassificationDataset;
pub use rag::{load_context_store, JsonlRagDataset};

use serde::Deserialize;
use serde_json::Value;

use crate::registry::{parse_params, Registry};
use crate::types::{Example, Params};
use crate::Result;

/// Lazy example sequence produced by a dataset.
pub type ExampleIter = Box<dyn Iterator<Item = Result<Example>> + Send>;

/// A finite source of labeled examples.
pub trait Dataset: Send {
    /// Consume the dataset and produce its examples in order.
    ///
    /// Opening the underlying source may fail up front; malformed records
    /// surface as `Err` items while iterating.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Dataset`] or [`crate::Error::Io`] when the source
    /// cannot be opened.
    fn into_examples(self: Box<Self>) -> Result<ExampleIter>;
}

/// Examples held in memory, typically embedded in a config.
#[derive(Debug, Clone, Default)]
pub struct InlineDataset {
    examples: Vec<Example>,
}

impl InlineDataset {
    /// Wrap an existing example list.
    #[must_use]
    pub fn new(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    fn from_params(params: &Params) -> Result<Self> {
        let params: InlineParams = parse_params("inline", params)?;
        let examples = params
            .examples
            .into_iter()
            .enumerate()
            .map(|(idx, record)| record.into_example(idx))
            .collect();
        Ok(Self { examples })
    }
}

impl Dataset for InlineDataset {
    fn into_examples(self: Box<Self>) -> Result<ExampleIter> {
        Ok(Box::new(self.examples.into_iter().map(Ok)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InlineParams {
    #[serde(default)]
    examples: Vec<InlineRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InlineRecord {
    #[serde(default, alias = "id")]
    uid: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    inputs: Params,
    #[serde(default, alias = "label")]
    expected_output: Value,
    #[serde(default)]
    metadata: Params,
}

impl InlineRecord {
    fn into_example(self, idx: usize) -> Example {
        let mut inputs = self.inputs;
        if let Some(text) = self.text {
            inputs.insert("text".to_string(), text);
        }
        Example {
            uid: uid_of(self.uid.as_ref(), idx),
            inputs,
            expected_output: self.expected_output,
            metadata: self.metadata,
        }
    }
}

/// Example uid from an explicit `id` field, falling back to the record index.
pub(crate) fn uid_of(id: Option<&Value>, idx: usize) -> String {
    match id {
        None | Some(Value::Null) => idx.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// First present, non-empty value among `keys` (empty strings are skipped).
pub(crate) fn first_present<'a>(
    payload: &'a serde_json::Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Value> {
    keys.iter().filter_map(|key| payload.get(*key)).find(|value| match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

pub(crate) fn register_builtins(registry: &Registry<dyn Dataset>) -> Result<()> {
    registry.register("jsonl-classification", |params: &Params| {
        Ok(Box::new(JsonlClassificationDataset::from_params(params)?) as Box<dyn Dataset>)
    })?;
    registry.register("jsonl-rag", |params: &Params| {
        Ok(Box::new(JsonlRagDataset::from_params(params)?) as Box<dyn Dataset>)
    })?;
    registry.register("inline", |params: &Params| {
        Ok(Box::new(InlineDataset::from_params(params)?) as Box<dyn Dataset>)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test params must be an object"),
        }
    }

    #[test]
    fn test_inline_dataset_from_params() {
        let dataset = InlineDataset::from_params(&params(json!({
            "examples": [
                {"id": "a", "text": "great", "label": "pos"},
                {"text": "awful", "label": "neg"},
                {"uid": 7, "inputs": {"question": "why?"}, "expected_output": "because"}
            ]
        })))
        .unwrap();
        assert_eq!(dataset.len(), 3);

        let examples: Vec<Example> = Box::new(dataset)
            .into_examples()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(examples[0].uid, "a");
        assert_eq!(examples[0].input_text(), Some("great"));
        assert_eq!(examples[1].uid, "1");
        assert_eq!(examples[1].expected_output, json!("neg"));
        assert_eq!(examples[2].uid, "7");
        assert_eq!(examples[2].inputs.get("question"), Some(&json!("why?")));
    }

    #[test]
    fn test_inline_dataset_rejects_unknown_fields() {
        let err = InlineDataset::from_params(&params(json!({"rows": []}))).unwrap_err();
        assert!(err.to_string().contains("inline"));
    }

    #[test]
    fn test_first_present_skips_empty_strings() {
        let payload = params(json!({"text": "", "input": "fallback"}));
        assert_eq!(
            first_present(&payload, &["text", "input"]),
            Some(&json!("fallback"))
        );
        assert_eq!(first_present(&payload, &["missing"]), None);
    }

    #[test]
    fn test_uid_of() {
        assert_eq!(uid_of(None, 3), "3");
        assert_eq!(uid_of(Some(&json!("x")), 3), "x");
        assert_eq!(uid_of(Some(&json!(12)), 3), "12");
    }
}
