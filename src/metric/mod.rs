//! Metrics: pure functions from (examples, predictions) to a named result
//!
//! `examples[i]` and `predictions[i]` always describe the same uid; the
//! runner guarantees the alignment.
//!
//! ## Undefined values
//!
//! - An aggregate over zero items (no scored examples, no labels) is `NaN`.
//! - A per-label ratio with a zero denominator counts as `0.0` inside averages.
//!
//! Examples whose `expected_output` is `null` are skipped by accuracy and by
//! every label-based metric.

mod classification;
mod generation;

pub use classification::{
    Accuracy, Average, ConfusionCounts, ConfusionMatrix, LabelDistribution, LabelScores,
    PrecisionRecallF1, Score,
};
pub use generation::{Bleu, ContextPrecision, RougeL};

use crate::registry::Registry;
use crate::types::{Example, MetricResult, Params, Prediction};
use crate::Result;

/// Metric keys accepted by classification tasks.
pub const CLASSIFICATION_METRICS: [&str; 6] = [
    "accuracy",
    "precision",
    "recall",
    "f1",
    "confusion-matrix",
    "label-distribution",
];

/// Metric keys accepted by generation / retrieval tasks.
pub const GENERATION_METRICS: [&str; 3] = ["rouge-l", "bleu", "context-precision"];

/// An aggregate statistic over all predictions of a run.
pub trait Metric: Send + Sync {
    /// Result name; unique within a run.
    fn name(&self) -> &str;

    /// Compute the metric.
    ///
    /// # Errors
    ///
    /// Any error aborts the run with [`crate::Error::MetricComputation`].
    fn compute(&self, examples: &[Example], predictions: &[Prediction]) -> Result<MetricResult>;
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0_u64), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

macro_rules! register_metric {
    ($registry:expr, $key:expr, $ty:ty) => {
        $registry.register($key, |params: &Params| {
            Ok(Box::new(<$ty>::from_params(params)?) as Box<dyn Metric>)
        })?;
    };
}

pub(crate) fn register_builtins(registry: &Registry<dyn Metric>) -> Result<()> {
    register_metric!(registry, "accuracy", Accuracy);
    registry.register("precision", |params: &Params| {
        Ok(Box::new(PrecisionRecallF1::from_params(Score::Precision, params)?) as Box<dyn Metric>)
    })?;
    registry.register("recall", |params: &Params| {
        Ok(Box::new(PrecisionRecallF1::from_params(Score::Recall, params)?) as Box<dyn Metric>)
    })?;
    registry.register("f1", |params: &Params| {
        Ok(Box::new(PrecisionRecallF1::from_params(Score::F1, params)?) as Box<dyn Metric>)
    })?;
    register_metric!(registry, "confusion-matrix", ConfusionMatrix);
    register_metric!(registry, "label-distribution", LabelDistribution);
    register_metric!(registry, "rouge-l", RougeL);
    register_metric!(registry, "bleu", Bleu);
    register_metric!(registry, "context-precision", ContextPrecision);
    Ok(())
}
