//! Error types for Trueno-Eval
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Configuration errors (`DuplicateKey`, `UnknownComponent`,
//! `ComponentConstruction`, `InvalidMetric`, `InvalidConfig`) surface before any
//! example is processed. `Prediction` errors are absorbed into the prediction
//! record. `MetricComputation` aborts the run before anything is persisted.

use crate::registry::ComponentKind;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Eval error types
#[derive(Error, Debug)]
pub enum Error {
    /// A key was registered twice under the same component kind
    #[error("{kind} registry already contains an entry for '{key}'")]
    DuplicateKey {
        /// Registry scope
        kind: ComponentKind,
        /// Offending key
        key: String,
    },

    /// No factory registered under the requested key
    #[error("Unknown {kind} '{key}'. Available: {available}")]
    UnknownComponent {
        /// Registry scope
        kind: ComponentKind,
        /// Requested key
        key: String,
        /// Comma-separated list of registered keys (or `<empty>`)
        available: String,
    },

    /// A registered factory failed to build its component
    #[error("Failed to construct {kind} '{key}': {source}")]
    ComponentConstruction {
        /// Registry scope
        kind: ComponentKind,
        /// Key of the failing factory
        key: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// A configured metric is not accepted by the configured task
    #[error("Metric '{metric}' is not valid for task '{task}'. Accepted: {accepted}")]
    InvalidMetric {
        /// Metric key from the config
        metric: String,
        /// Task key from the config
        task: String,
        /// Comma-separated list of metrics the task accepts
        accepted: String,
    },

    /// Structurally invalid configuration or component parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dataset could not be read or contains malformed examples
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model adapter failed on a single example (recorded, never fatal)
    #[error("Prediction failed for example '{uid}': {reason}")]
    Prediction {
        /// Example uid
        uid: String,
        /// Adapter-provided reason
        reason: String,
    },

    /// A metric implementation failed; the run is discarded
    #[error("Metric '{metric}' failed: {source}\nThe run was not persisted.")]
    MetricComputation {
        /// Metric result name
        metric: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// No config preset or file matches the identifier
    #[error("Config '{0}' not found")]
    ConfigNotFound(String),

    /// No persisted run with the given id
    #[error("Run with id {0} not found")]
    RunNotFound(i64),

    /// Run store failure not covered by a more specific variant
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether this error means "the requested thing does not exist".
    ///
    /// Callers can map these to a 404-style response without matching on variants.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RunNotFound(_) | Self::ConfigNotFound(_) | Self::UnknownComponent { .. }
        )
    }
}
