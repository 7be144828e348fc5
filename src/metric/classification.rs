//! Classification metrics over labelled outputs
//!
//! All label-based metrics share [`ConfusionCounts`]: a square count matrix
//! indexed by the sorted union of gold and predicted labels, where
//! `matrix[i][j]` counts examples with gold label `i` predicted as `j`.
//!
//! Two outputs carry the same label exactly when they are equal JSON values,
//! the same rule [`Accuracy`] applies. Labels render through [`label_of`];
//! when two distinct values would render alike (the string `"1"` and the
//! number `1`), every label of that result renders as compact JSON text.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{json, Value};

use super::{mean, ratio, Metric};
use crate::registry::parse_params;
use crate::types::{label_of, Example, MetricResult, Params, Prediction};
use crate::Result;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameOnly {
    #[serde(default)]
    name: Option<String>,
}

fn name_param(component: &str, params: &Params, default: &str) -> Result<String> {
    let params: NameOnly = parse_params(component, params)?;
    Ok(params.name.unwrap_or_else(|| default.to_string()))
}

// ============================================================================
// Confusion counts
// ============================================================================

/// Label-indexed confusion counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfusionCounts {
    labels: Vec<String>,
    matrix: Vec<Vec<u64>>,
}

impl ConfusionCounts {
    /// Count (gold, predicted) output pairs, skipping examples without a gold output.
    #[must_use]
    pub fn from_predictions(examples: &[Example], predictions: &[Prediction]) -> Self {
        let pairs: Vec<(&Value, &Value)> = examples
            .iter()
            .zip(predictions)
            .filter(|(example, _)| example.has_expected())
            .map(|(example, prediction)| (&example.expected_output, &prediction.predicted_output))
            .collect();
        Self::from_values(&pairs)
    }

    /// Count explicit `(gold, predicted)` string label pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let values: Vec<(Value, Value)> = pairs
            .iter()
            .map(|(gold, predicted)| (Value::String(gold.clone()), Value::String(predicted.clone())))
            .collect();
        let pairs: Vec<(&Value, &Value)> = values.iter().map(|(gold, predicted)| (gold, predicted)).collect();
        Self::from_values(&pairs)
    }

    fn from_values(pairs: &[(&Value, &Value)]) -> Self {
        // Compact JSON text is the identity; the display name leads the sort
        // so labels order as they render.
        let keys: Vec<(String, String)> = pairs
            .iter()
            .flat_map(|(gold, predicted)| [*gold, *predicted])
            .map(|value| (label_of(value), value.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<&str, usize> = keys
            .iter()
            .enumerate()
            .map(|(i, (_, identity))| (identity.as_str(), i))
            .collect();

        let mut matrix = vec![vec![0_u64; keys.len()]; keys.len()];
        for (gold, predicted) in pairs {
            let gold = index[gold.to_string().as_str()];
            let predicted = index[predicted.to_string().as_str()];
            matrix[gold][predicted] += 1;
        }

        let displays: BTreeSet<&str> = keys.iter().map(|(display, _)| display.as_str()).collect();
        let labels = if displays.len() == keys.len() {
            keys.into_iter().map(|(display, _)| display).collect()
        } else {
            keys.into_iter().map(|(_, identity)| identity).collect()
        };

        Self { labels, matrix }
    }

    /// Sorted label set.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Raw counts: `matrix[gold][predicted]`.
    #[must_use]
    pub fn matrix(&self) -> &[Vec<u64>] {
        &self.matrix
    }

    /// Number of counted examples.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.matrix.iter().flatten().sum()
    }

    /// Correctly predicted examples (matrix trace).
    #[must_use]
    pub fn correct(&self) -> u64 {
        (0..self.labels.len()).map(|i| self.matrix[i][i]).sum()
    }

    /// True positives for label `i`.
    #[must_use]
    pub fn true_positives(&self, i: usize) -> u64 {
        self.matrix[i][i]
    }

    /// Examples predicted as label `i` (column sum).
    #[must_use]
    pub fn predicted_count(&self, i: usize) -> u64 {
        self.matrix.iter().map(|row| row[i]).sum()
    }

    /// Gold support for label `i` (row sum).
    #[must_use]
    pub fn support(&self, i: usize) -> u64 {
        self.matrix[i].iter().sum()
    }

    /// Precision, recall, F1 and support for label `i`.
    ///
    /// Ratios with a zero denominator are `0.0`.
    #[must_use]
    pub fn scores(&self, i: usize) -> LabelScores {
        let tp = self.true_positives(i);
        let zero_if_undefined = |value: f64| if value.is_nan() { 0.0 } else { value };
        let precision = zero_if_undefined(ratio(tp, self.predicted_count(i)));
        let recall = zero_if_undefined(ratio(tp, self.support(i)));
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        LabelScores {
            precision,
            recall,
            f1,
            support: self.support(i),
        }
    }

    /// Averaged score across labels.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn average(&self, score: Score, average: Average) -> f64 {
        let indices = 0..self.labels.len();
        match average {
            Average::Macro => mean(indices.map(|i| score.pick(&self.scores(i)))),
            Average::Weighted => {
                let total_support: u64 = indices.clone().map(|i| self.support(i)).sum();
                if total_support == 0 {
                    return f64::NAN;
                }
                let weighted: f64 = indices
                    .map(|i| {
                        let scores = self.scores(i);
                        scores.support as f64 * score.pick(&scores)
                    })
                    .sum();
                weighted / total_support as f64
            }
            // Every counted example is exactly one prediction and one gold
            // label, so micro precision, recall and F1 all equal accuracy.
            Average::Micro => ratio(self.correct(), self.total()),
        }
    }
}

/// Per-label scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelScores {
    /// tp / predicted
    pub precision: f64,
    /// tp / support
    pub recall: f64,
    /// Harmonic mean of precision and recall
    pub f1: f64,
    /// Gold examples carrying the label
    pub support: u64,
}

/// Which per-label score to average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Precision
    Precision,
    /// Recall
    Recall,
    /// F1
    F1,
}

impl Score {
    const fn pick(self, scores: &LabelScores) -> f64 {
        match self {
            Self::Precision => scores.precision,
            Self::Recall => scores.recall,
            Self::F1 => scores.f1,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
        }
    }
}

/// Averaging strategy for multi-class metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    /// Unweighted mean over every label present in gold or predictions
    #[default]
    Macro,
    /// Mean weighted by gold support
    Weighted,
    /// Computed from global counts
    Micro,
}

impl Average {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Macro => "macro",
            Self::Weighted => "weighted",
            Self::Micro => "micro",
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Fraction of scored examples whose prediction equals the gold output.
#[derive(Debug, Clone)]
pub struct Accuracy {
    name: String,
}

impl Accuracy {
    /// Accuracy reported under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self::new(name_param("accuracy", params, "accuracy")?))
    }
}

impl Metric for Accuracy {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let (correct, total) = examples
            .iter()
            .zip(predictions)
            .filter(|(example, _)| example.has_expected())
            .fold((0_u64, 0_u64), |(correct, total), (example, prediction)| {
                let hit = u64::from(example.expected_output == prediction.predicted_output);
                (correct + hit, total + 1)
            });

        Ok(MetricResult::new(&self.name, ratio(correct, total))
            .with_detail("correct", json!(correct))
            .with_detail("total", json!(total)))
    }
}

/// Macro/weighted/micro precision, recall or F1.
#[derive(Debug, Clone)]
pub struct PrecisionRecallF1 {
    name: String,
    score: Score,
    average: Average,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AveragedParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    average: Average,
}

impl PrecisionRecallF1 {
    /// Metric named `<score>_<average>`, e.g. `f1_macro`.
    #[must_use]
    pub fn new(score: Score, average: Average) -> Self {
        Self {
            name: format!("{}_{}", score.as_str(), average.as_str()),
            score,
            average,
        }
    }

    pub(crate) fn from_params(score: Score, params: &Params) -> Result<Self> {
        let params: AveragedParams = parse_params(score.as_str(), params)?;
        let mut metric = Self::new(score, params.average);
        if let Some(name) = params.name {
            metric.name = name;
        }
        Ok(metric)
    }
}

impl Metric for PrecisionRecallF1 {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let counts = ConfusionCounts::from_predictions(examples, predictions);
        let per_label: serde_json::Map<String, Value> = counts
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let scores = counts.scores(i);
                (
                    label.clone(),
                    json!({
                        "precision": scores.precision,
                        "recall": scores.recall,
                        "f1": scores.f1,
                        "support": scores.support,
                    }),
                )
            })
            .collect();

        Ok(
            MetricResult::new(&self.name, counts.average(self.score, self.average))
                .with_detail("average", json!(self.average.as_str()))
                .with_detail("labels", json!(counts.labels()))
                .with_detail("per_label", Value::Object(per_label)),
        )
    }
}

/// Full confusion matrix; headline value is the diagonal fraction.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    name: String,
}

impl ConfusionMatrix {
    /// Confusion matrix reported under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self::new(name_param("confusion-matrix", params, "confusion_matrix")?))
    }
}

impl Metric for ConfusionMatrix {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let counts = ConfusionCounts::from_predictions(examples, predictions);
        Ok(
            MetricResult::new(&self.name, ratio(counts.correct(), counts.total()))
                .with_detail("labels", json!(counts.labels()))
                .with_detail("matrix", json!(counts.matrix())),
        )
    }
}

/// Gold and predicted label counts over the full label set.
///
/// The headline value is always `1.0`; everything lives in `details`.
#[derive(Debug, Clone)]
pub struct LabelDistribution {
    name: String,
}

impl LabelDistribution {
    /// Label distribution reported under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        Ok(Self::new(name_param(
            "label-distribution",
            params,
            "label_distribution",
        )?))
    }
}

impl Metric for LabelDistribution {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult> {
        let counts = ConfusionCounts::from_predictions(examples, predictions);
        let gold: BTreeMap<&str, u64> = counts
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), counts.support(i)))
            .collect();
        let predicted: BTreeMap<&str, u64> = counts
            .labels()
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), counts.predicted_count(i)))
            .collect();

        Ok(MetricResult::new(&self.name, 1.0)
            .with_detail("gold", json!(gold))
            .with_detail("predicted", json!(predicted)))
    }
}
