//! JSON Lines dataset for retrieval-augmented question answering

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use super::{first_present, uid_of, Dataset, ExampleIter};
use crate::registry::parse_params;
use crate::types::{Example, Params};
use crate::{Error, Result};

const CONSUMED_KEYS: [&str; 6] = ["id", "question", "input", "text", "answer", "expected_answer"];

/// Context id -> context text.
pub type ContextStore = BTreeMap<String, String>;

/// Question/answer pairs with optional reference contexts.
///
/// Each line provides `question` (or `input`/`text`) and `answer` (or
/// `expected_answer`). `context_ids` (or `contexts`) reference entries of an
/// optional context store; resolved texts land in
/// `metadata.reference_contexts`.
#[derive(Debug, Clone)]
pub struct JsonlRagDataset {
    path: PathBuf,
    contexts_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RagParams {
    path: PathBuf,
    #[serde(default)]
    contexts_path: Option<PathBuf>,
}

impl JsonlRagDataset {
    /// Dataset reading questions from `path` and, optionally, contexts from
    /// `contexts_path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, contexts_path: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contexts_path,
        }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let params: RagParams = parse_params("jsonl-rag", params)?;
        Ok(Self::new(params.path, params.contexts_path))
    }
}

impl Dataset for JsonlRagDataset {
    fn into_examples(self: Box<Self>) -> Result<ExampleIter> {
        let contexts = match &self.contexts_path {
            Some(path) => load_context_store(path)?,
            None => ContextStore::new(),
        };

        let file = File::open(&self.path).map_err(|e| {
            Error::Dataset(format!("Failed to open {}: {e}", self.path.display()))
        })?;
        let path = self.path;

        let iter = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(idx, line)| match line {
                Err(e) => Some(Err(Error::Io(e))),
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(parse_line(&path, idx, line.trim(), &contexts)),
            });

        Ok(Box::new(iter))
    }
}

fn parse_line(path: &Path, idx: usize, line: &str, contexts: &ContextStore) -> Result<Example> {
    let payload: serde_json::Map<String, Value> = serde_json::from_str(line).map_err(|e| {
        Error::Dataset(format!("{}:{}: each example must be a JSON object: {e}", path.display(), idx + 1))
    })?;

    let uid = uid_of(payload.get("id"), idx);
    let question = first_present(&payload, &["question", "input", "text"])
        .ok_or_else(|| Error::Dataset(format!("Example {uid} is missing a 'question' field")))?;
    let question = text_of(question);
    let expected = first_present(&payload, &["answer", "expected_answer"])
        .cloned()
        .ok_or_else(|| Error::Dataset(format!("Example {uid} is missing an 'answer' field")))?;

    let context_ids: Vec<String> = match first_present(&payload, &["context_ids", "contexts"]) {
        Some(Value::Array(items)) => items.iter().map(text_of).collect(),
        Some(single) => vec![text_of(single)],
        None => Vec::new(),
    };

    let mut metadata: Params = payload
        .iter()
        .filter(|(key, _)| !CONSUMED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if !context_ids.is_empty() {
        let references: Vec<Value> = context_ids
            .iter()
            .filter_map(|id| contexts.get(id))
            .map(|text| Value::String(text.clone()))
            .collect();
        metadata.insert(
            "context_ids".to_string(),
            Value::Array(context_ids.into_iter().map(Value::String).collect()),
        );
        metadata.insert("reference_contexts".to_string(), Value::Array(references));
    }

    let mut inputs = Params::new();
    inputs.insert("question".to_string(), Value::String(question.clone()));
    inputs.insert("text".to_string(), Value::String(question));

    Ok(Example {
        uid,
        inputs,
        expected_output: expected,
        metadata,
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load a context store.
///
/// Accepted layouts:
/// - `.jsonl`: one `{id?, text|content}` object per line (id defaults to line index)
/// - `.json` list of `{id?, text|content}` objects (id defaults to position)
/// - `.json` object mapping id -> text
///
/// # Errors
///
/// Returns [`Error::Dataset`] if the file is missing or malformed.
pub fn load_context_store(path: &Path) -> Result<ContextStore> {
    if !path.exists() {
        return Err(Error::Dataset(format!(
            "Context file not found at {}",
            path.display()
        )));
    }

    let is_jsonl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

    let mut store = ContextStore::new();
    if is_jsonl {
        let reader = BufReader::new(File::open(path)?);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: Value = serde_json::from_str(line)?;
            let (id, text) = context_entry(&entry, idx)?;
            store.insert(id, text);
        }
        return Ok(store);
    }

    let payload: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    match payload {
        Value::Array(entries) => {
            for (idx, entry) in entries.iter().enumerate() {
                let (id, text) = context_entry(entry, idx)?;
                store.insert(id, text);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                let Value::String(text) = value else {
                    return Err(Error::Dataset(
                        "Context dictionary values must be strings".to_string(),
                    ));
                };
                store.insert(key, text);
            }
        }
        _ => {
            return Err(Error::Dataset(
                "Unsupported context format. Use JSONL, a list of objects, or a mapping."
                    .to_string(),
            ))
        }
    }
    Ok(store)
}

fn context_entry(entry: &Value, idx: usize) -> Result<(String, String)> {
    let Value::Object(map) = entry else {
        return Err(Error::Dataset(
            "Each context entry must be an object with 'id' and 'text'".to_string(),
        ));
    };
    let id = uid_of(map.get("id"), idx);
    let text = first_present(map, &["text", "content"])
        .ok_or_else(|| Error::Dataset(format!("Context entry '{id}' is missing a 'text' field")))?;
    Ok((id, text_of(text)))
}
