//! Model adapters: map one example to one prediction
//!
//! Adapters report per-example failures as `Err`; the runner turns them into
//! failed predictions and keeps going.

mod keyword;

pub use keyword::{KeywordCategory, KeywordMatchingModel};

use crate::registry::Registry;
use crate::types::{Example, ModelResponse, Params};
use crate::Result;

/// A model under evaluation.
pub trait ModelAdapter: Send {
    /// Adapter name, recorded in prediction metadata.
    fn name(&self) -> &str;

    /// Prepare the model before the first prediction (load weights, prime caches).
    ///
    /// # Errors
    ///
    /// A warmup failure is fatal to the run.
    fn warmup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Predict the output for a single example.
    ///
    /// # Errors
    ///
    /// Any error is recorded on that example's prediction only.
    fn predict(&self, example: &Example) -> Result<ModelResponse>;

    /// Predict a batch of examples, one result per example, in order.
    fn predict_batch(&self, examples: &[Example]) -> Vec<Result<ModelResponse>> {
        examples.iter().map(|example| self.predict(example)).collect()
    }
}

pub(crate) fn register_builtins(registry: &Registry<dyn ModelAdapter>) -> Result<()> {
    registry.register("keyword-matching", |params: &Params| {
        Ok(Box::new(KeywordMatchingModel::from_params(params)?) as Box<dyn ModelAdapter>)
    })?;
    Ok(())
}
