//! # Trueno-Eval: Configurable Model Evaluation Engine
//!
//! **Version**: 0.1.0
//!
//! Trueno-Eval runs a model over a labeled dataset, scores the predictions
//! with a configurable metric set, and records every run so it can be
//! listed and inspected later.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke**: Configs are validated against the task before any example runs
//! - **Jidoka**: A broken metric stops the run; nothing half-computed is stored
//! - **Heijunka**: One bad example degrades the score, never the run
//! - **Genchi Genbutsu**: Every prediction is kept next to its gold output
//!
//! ## Architecture
//!
//! ```text
//! ConfigSpec ──► ConfigResolver ──► (Task, Dataset, ModelAdapter, [Metric])
//!                    ▲                           │
//!            ComponentRegistry                   ▼
//!                                            Evaluator ──► Run ──► RunStore
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use serde_json::json;
//! use trueno_eval::config::{ComponentSpec, ConfigSpec, MetricSpec};
//! use trueno_eval::registry::ComponentRegistry;
//! use trueno_eval::store::{MemoryRunStore, RunStore};
//! use trueno_eval::Evaluator;
//!
//! let registry = ComponentRegistry::with_builtins()?;
//! let spec = ConfigSpec::new(
//!     "text-classification",
//!     ComponentSpec::new("inline").with_param(
//!         "examples",
//!         json!([
//!             {"id": "1", "text": "great product", "label": "positive"},
//!             {"id": "2", "text": "awful support", "label": "negative"}
//!         ]),
//!     ),
//!     ComponentSpec::new("keyword-matching")
//!         .with_param("positive_keywords", json!(["great"]))
//!         .with_param("negative_keywords", json!(["awful"])),
//! )
//! .with_metric(MetricSpec::new("accuracy"));
//!
//! let store = MemoryRunStore::new();
//! let run = Evaluator::new(&registry).run_and_save(&spec, None, &store)?;
//! assert_eq!(run.metric("accuracy").map(|m| m.value), Some(1.0));
//! assert_eq!(store.list()?.len(), 1);
//! # Ok::<(), trueno_eval::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod metric;
pub mod model;
pub mod registry;
pub mod runner;
pub mod store;
pub mod task;
pub mod types;

pub use config::{resolve_config, ConfigSpec};
pub use error::{Error, Result};
pub use registry::ComponentRegistry;
pub use runner::{run_evaluation, Evaluator, Run};
pub use store::{MemoryRunStore, RunDetail, RunStore, RunSummary, SqliteRunStore};
pub use types::{Example, MetricResult, Prediction};
