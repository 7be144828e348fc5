//! JSON Lines text-classification dataset

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use super::{first_present, uid_of, Dataset, ExampleIter};
use crate::registry::parse_params;
use crate::types::{Example, Params};
use crate::{Error, Result};

const CONSUMED_KEYS: [&str; 4] = ["id", "text", "input", "label"];

/// Text-classification examples stored one JSON object per line.
///
/// Each non-blank line must provide `text` (or `input`) and `label`. The uid
/// comes from `id`, falling back to the zero-based line number. Any other
/// keys are kept as example metadata.
#[derive(Debug, Clone)]
pub struct JsonlClassificationDataset {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonlParams {
    path: PathBuf,
}

impl JsonlClassificationDataset {
    /// Dataset reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Source file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let params: JsonlParams = parse_params("jsonl-classification", params)?;
        Ok(Self::new(params.path))
    }
}

impl Dataset for JsonlClassificationDataset {
    fn into_examples(self: Box<Self>) -> Result<ExampleIter> {
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
                Ok(line) => Some(parse_line(&path, idx, line.trim())),
            });

        Ok(Box::new(iter))
    }
}

fn parse_line(path: &Path, idx: usize, line: &str) -> Result<Example> {
    let payload: serde_json::Map<String, Value> = serde_json::from_str(line).map_err(|e| {
        Error::Dataset(format!("{}:{}: invalid JSON object: {e}", path.display(), idx + 1))
    })?;

    let uid = uid_of(payload.get("id"), idx);
    let text = first_present(&payload, &["text", "input"]).ok_or_else(|| {
        Error::Dataset(format!(
            "Example {uid} is missing a 'text' or 'input' field in {}",
            path.display()
        ))
    })?;
    let expected = match payload.get("label") {
        Some(value) if !value.is_null() => value.clone(),
        _ => {
            return Err(Error::Dataset(format!(
                "Example {uid} is missing a 'label' field in {}",
                path.display()
            )))
        }
    };

    let mut inputs = Params::new();
    inputs.insert("text".to_string(), text.clone());

    let metadata = payload
        .iter()
        .filter(|(key, _)| !CONSUMED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Example {
        uid,
        inputs,
        expected_output: expected,
        metadata,
    })
}
