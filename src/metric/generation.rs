//! Token-overlap metrics for free-text answers
//!
//! Text is lowercased and split on whitespace. A `null` output or gold
//! answer tokenizes as empty; other non-string values use their JSON text.
//! Each metric reports the mean of its per-example scores and keeps the
//! scores under `details.per_example` keyed by uid.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;
use serde_json::{json, Value};

use super::{mean, Metric};
use crate::registry::parse_params;
use crate::types::{Example, MetricResult, Params, Prediction};
use crate::{Error, Result};

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tokenize(value: &Value) -> Vec<String> {
    text_of(value)
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn summarize(name: &str, per_example: &BTreeMap<String, f64>) -> MetricResult {
    MetricResult::new(name, mean(per_example.values().copied()))
        .with_detail("per_example", json!(per_example))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameOnly {
    #[serde(default)]
    name: Option<String>,
}

// ============================================================================
// ROUGE-L
// ============================================================================

/// Length of the longest common subsequence of two token streams.
fn lcs_length(reference: &[String], hypothesis: &[String]) -> usize {
    if reference.is_empty() || hypothesis.is_empty() {
        return 0;
    }
    let mut previous = vec![0_usize; hypothesis.len() + 1];
    let mut current = vec![0_usize; hypothesis.len() + 1];
    for ref_token in reference {
        for (j, hyp_token) in hypothesis.iter().enumerate() {
            current[j + 1] = if ref_token == hyp_token {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[hypothesis.len()]
}

/// ROUGE-L F1 between one reference and one hypothesis.
///
/// Two empty texts agree perfectly (`1.0`).
#[allow(clippy::cast_precision_loss)]
#[must_use]
fn rouge_l_f1(reference: &[String], hypothesis: &[String]) -> f64 {
    if reference.is_empty() && hypothesis.is_empty() {
        return 1.0;
    }
    let lcs = lcs_length(reference, hypothesis) as f64;
    let precision = if hypothesis.is_empty() {
        0.0
    } else {
        lcs / hypothesis.len() as f64
    };
    let recall = if reference.is_empty() {
        0.0
    } else {
        lcs / reference.len() as f64
    };
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Mean ROUGE-L F1 across examples.
#[derive(Debug, Clone)]
pub struct RougeL {
    name: String,
}

impl RougeL {
    /// ROUGE-L reported under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let params: NameOnly = parse_params("rouge-l", params)?;
        Ok(Self::new(params.name.unwrap_or_else(|| "rouge_l".to_string())))
    }
}

impl Metric for RougeL {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let per_example: BTreeMap<String, f64> = examples
            .iter()
            .zip(predictions)
            .map(|(example, prediction)| {
                let reference = tokenize(&example.expected_output);
                let hypothesis = tokenize(&prediction.predicted_output);
                (example.uid.clone(), rouge_l_f1(&reference, &hypothesis))
            })
            .collect();
        Ok(summarize(&self.name, &per_example))
    }
}

// ============================================================================
// BLEU
// ============================================================================

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    counts
}

/// Clipped n-gram precision of `candidate` against `reference`.
#[allow(clippy::cast_precision_loss)]
fn modified_precision(candidate: &[String], reference: &[String], n: usize) -> f64 {
    if candidate.len() < n {
        return 0.0;
    }
    let candidate_counts = ngram_counts(candidate, n);
    let reference_counts = ngram_counts(reference, n);
    let clipped: usize = candidate_counts
        .iter()
        .map(|(ngram, &count)| count.min(reference_counts.get(ngram).copied().unwrap_or(0)))
        .sum();
    let total: usize = candidate_counts.values().sum();
    if total == 0 {
        0.0
    } else {
        clipped as f64 / total as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn brevity_penalty(candidate_len: usize, reference_len: usize) -> f64 {
    if candidate_len == 0 {
        0.0
    } else if reference_len == 0 || candidate_len > reference_len {
        1.0
    } else {
        (1.0 - reference_len as f64 / candidate_len as f64).exp()
    }
}

/// Sentence-level BLEU with additive smoothing of zero precisions,
/// averaged across examples.
#[derive(Debug, Clone)]
pub struct Bleu {
    name: String,
    max_n: usize,
    smoothing: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BleuParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_max_n")]
    max_n: usize,
    #[serde(default = "default_smoothing")]
    smoothing: f64,
}

const fn default_max_n() -> usize {
    4
}

const fn default_smoothing() -> f64 {
    1e-9
}

impl Bleu {
    /// BLEU up to `max_n`-grams (at least unigrams).
    #[must_use]
    pub fn new(max_n: usize, smoothing: f64) -> Self {
        Self {
            name: "bleu".to_string(),
            max_n: max_n.max(1),
            smoothing,
        }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let params: BleuParams = parse_params("bleu", params)?;
        // ln(smoothing) stands in for a zero precision, so it must be a
        // finite log of a value in (0, 1].
        let in_range = params.smoothing > 0.0 && params.smoothing <= 1.0;
        if !in_range {
            return Err(Error::InvalidConfig(format!(
                "bleu smoothing must be in (0, 1], got {}",
                params.smoothing
            )));
        }
        let mut metric = Self::new(params.max_n, params.smoothing);
        if let Some(name) = params.name {
            metric.name = name;
        }
        Ok(metric)
    }

    /// BLEU of one candidate against one reference.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn score(&self, candidate: &[String], reference: &[String]) -> f64 {
        if candidate.is_empty() {
            return 0.0;
        }
        let log_sum: f64 = (1..=self.max_n)
            .map(|n| {
                let precision = modified_precision(candidate, reference, n);
                if precision > 0.0 {
                    precision.ln()
                } else {
                    self.smoothing.ln()
                }
            })
            .sum();
        let geometric_mean = (log_sum / self.max_n as f64).exp();
        brevity_penalty(candidate.len(), reference.len()) * geometric_mean
    }
}

impl Metric for Bleu {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let per_example: BTreeMap<String, f64> = examples
            .iter()
            .zip(predictions)
            .map(|(example, prediction)| {
                let reference = tokenize(&example.expected_output);
                let candidate = tokenize(&prediction.predicted_output);
                (example.uid.clone(), self.score(&candidate, &reference))
            })
            .collect();
        Ok(summarize(&self.name, &per_example).with_detail("max_n", json!(self.max_n)))
    }
}

// ============================================================================
// Context precision
// ============================================================================

/// Context texts for one prediction: the adapter's `retrieved_documents`
/// when present, otherwise the example's `reference_contexts`.
fn context_texts(example: &Example, prediction: &Prediction) -> Vec<String> {
    let retrieved: Vec<String> = prediction
        .metadata
        .get("retrieved_documents")
        .and_then(Value::as_array)
        .map(|documents| {
            documents
                .iter()
                .filter_map(|document| document.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !retrieved.is_empty() {
        return retrieved;
    }

    example
        .metadata
        .get("reference_contexts")
        .and_then(Value::as_array)
        .map(|references| references.iter().map(text_of).collect())
        .unwrap_or_default()
}

/// Fraction of predicted tokens that appear in the supporting context.
///
/// A crude grounding check: answers built from words absent in the context
/// score low.
#[derive(Debug, Clone)]
pub struct ContextPrecision {
    name: String,
}

impl ContextPrecision {
    /// Context precision reported under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let params: NameOnly = parse_params("context-precision", params)?;
        Ok(Self::new(
            params.name.unwrap_or_else(|| "context_precision".to_string()),
        ))
    }
}

impl Metric for ContextPrecision {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::cast_precision_loss)]
    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let per_example: BTreeMap<String, f64> = examples
            .iter()
            .zip(predictions)
            .map(|(example, prediction)| {
                let predicted = tokenize(&prediction.predicted_output);
                let context = Value::String(context_texts(example, prediction).join(" "));
                let context_tokens: HashSet<String> = tokenize(&context).into_iter().collect();

                let score = if predicted.is_empty() || context_tokens.is_empty() {
                    0.0
                } else {
                    let hits = predicted
                        .iter()
                        .filter(|token| context_tokens.contains(*token))
                        .count();
                    hits as f64 / predicted.len() as f64
                };
                (example.uid.clone(), score)
            })
            .collect();
        Ok(summarize(&self.name, &per_example))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelResponse;

    fn pair(uid: &str, gold: &str, predicted: Value) -> (Example, Prediction) {
        let example = Example::text(uid, "q", json!(gold));
        let prediction = Prediction::from_response(&example, ModelResponse::new(predicted));
        (example, prediction)
    }

    fn tokens(text: &str) -> Vec<String> {
        tokenize(&json!(text))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_tokenize_lowercases_and_handles_null() {
        assert_eq!(tokens("The  Cat\tsat"), ["the", "cat", "sat"]);
        assert!(tokenize(&Value::Null).is_empty());
        assert_eq!(tokenize(&json!(42)), ["42"]);
    }

    #[test]
    fn test_lcs_length() {
        assert_eq!(lcs_length(&tokens("a b c d"), &tokens("a c d")), 3);
        assert_eq!(lcs_length(&tokens("a b"), &tokens("c d")), 0);
        assert_eq!(lcs_length(&[], &tokens("a")), 0);
    }

    #[test]
    fn test_rouge_l_scores() {
        assert!(approx(rouge_l_f1(&tokens("the cat sat"), &tokens("the cat sat")), 1.0));
        assert!(approx(rouge_l_f1(&[], &[]), 1.0));
        assert!(approx(rouge_l_f1(&tokens("a"), &[]), 0.0));
        // lcs = 2, p = 2/3, r = 2/4
        let f1 = rouge_l_f1(&tokens("a b c d"), &tokens("a x d"));
        assert!(approx(f1, 2.0 * (2.0 / 3.0) * 0.5 / (2.0 / 3.0 + 0.5)));
    }

    #[test]
    fn test_rouge_l_metric_averages_per_example() {
        let (e1, p1) = pair("1", "paris", json!("Paris"));
        let (e2, p2) = pair("2", "london", json!("rome"));
        let result = RougeL::new("rouge_l").compute(&[e1, e2], &[p1, p2]).unwrap();
        assert!(approx(result.value, 0.5));
        assert_eq!(result.details["per_example"], json!({"1": 1.0, "2": 0.0}));
    }

    #[test]
    fn test_bleu_identical_sentence_is_one() {
        let bleu = Bleu::new(4, 1e-9);
        let sentence = tokens("the quick brown fox jumps");
        assert!(approx(bleu.score(&sentence, &sentence), 1.0));
    }

    #[test]
    fn test_bleu_short_candidate_is_penalized() {
        let bleu = Bleu::new(1, 1e-9);
        // unigram precision 1.0, brevity penalty exp(1 - 4/2)
        let score = bleu.score(&tokens("the fox"), &tokens("the quick brown fox"));
        assert!(approx(score, (-1.0_f64).exp()));
    }

    #[test]
    fn test_bleu_empty_candidate_scores_zero() {
        let bleu = Bleu::new(4, 1e-9);
        assert!(approx(bleu.score(&[], &tokens("anything")), 0.0));
    }

    #[test]
    fn test_bleu_params() {
        let mut params = Params::new();
        params.insert("max_n".into(), json!(0));
        let bleu = Bleu::from_params(&params).unwrap();
        assert_eq!(bleu.max_n, 1);
        assert_eq!(bleu.name(), "bleu");

        let result = bleu.compute(&[], &[]).unwrap();
        assert!(result.value.is_nan());
        assert_eq!(result.details["max_n"], json!(1));
    }

    #[test]
    fn test_bleu_rejects_smoothing_outside_unit_interval() {
        for smoothing in [json!(0.0), json!(-0.5), json!(2.0)] {
            let mut params = Params::new();
            params.insert("smoothing".into(), smoothing.clone());
            let err = Bleu::from_params(&params).unwrap_err();
            assert!(
                matches!(err, Error::InvalidConfig(ref message) if message.contains("smoothing")),
                "smoothing {smoothing} gave {err}"
            );
        }

        let mut params = Params::new();
        params.insert("smoothing".into(), json!(1.0));
        assert!(Bleu::from_params(&params).is_ok());
    }

    #[test]
    fn test_context_precision_prefers_retrieved_documents() {
        let mut example = Example::text("1", "q", json!("paris"));
        example
            .metadata
            .insert("reference_contexts".into(), json!(["nothing relevant"]));
        let response = ModelResponse::new(json!("paris france"))
            .with_metadata("retrieved_documents", json!([{"text": "Paris is in France"}]));
        let prediction = Prediction::from_response(&example, response);

        let result = ContextPrecision::new("context_precision")
            .compute(&[example], &[prediction])
            .unwrap();
        assert!(approx(result.value, 1.0));
    }

    #[test]
    fn test_context_precision_falls_back_to_reference_contexts() {
        let mut example = Example::text("1", "q", json!("paris"));
        example
            .metadata
            .insert("reference_contexts".into(), json!(["Paris is lovely"]));
        let prediction = Prediction::from_response(&example, ModelResponse::new(json!("paris rome")));

        let result = ContextPrecision::new("context_precision")
            .compute(&[example], &[prediction])
            .unwrap();
        assert!(approx(result.value, 0.5));
    }

    #[test]
    fn test_context_precision_without_context_is_zero() {
        let (example, prediction) = pair("1", "x", json!("some answer"));
        let result = ContextPrecision::new("cp").compute(&[example], &[prediction]).unwrap();
        assert!(approx(result.value, 0.0));
        assert_eq!(result.name, "cp");
    }
}
