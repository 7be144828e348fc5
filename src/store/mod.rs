//! Run persistence
//!
//! Runs are append-only: a store assigns an id on [`RunStore::save`] and
//! afterwards only lists and reads. There is no update or delete.
//!
//! Two implementations share the same semantics:
//!
//! - [`SqliteRunStore`]: durable, WAL-mode SQLite file (or in-memory DB)
//! - [`MemoryRunStore`]: lock-free map for tests and ephemeral services

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::Run;
use crate::types::{MetricResult, Prediction};
use crate::{Error, Result};

/// Durable storage for completed runs.
///
/// Implementations must accept concurrent `save` calls without losing rows.
pub trait RunStore: Send + Sync {
    /// Persist `run` and return it with its new id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the run already carries an id, or the
    /// backend's error if the write fails.
    fn save(&self, run: Run) -> Result<Run>;

    /// Summaries of every stored run, most recently completed first.
    ///
    /// # Errors
    ///
    /// Backend read errors.
    fn list(&self) -> Result<Vec<RunSummary>>;

    /// Full record of run `id`, predictions included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotFound`] if no run has that id.
    fn get(&self, id: i64) -> Result<RunDetail>;
}

/// A stored run without its predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Store-assigned id
    pub id: i64,
    /// Run name
    pub name: String,
    /// Task key
    pub task: String,
    /// Config identifier
    pub config_name: String,
    /// Config file, if any
    pub config_path: Option<String>,
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// End of the run
    pub completed_at: DateTime<Utc>,
    /// Seconds between start and completion
    pub duration: f64,
    /// Metric results
    pub metrics: Vec<MetricResult>,
    /// JSON artifact path, if one was written
    pub artifact_path: Option<String>,
}

/// A stored run with its predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    /// Summary fields
    #[serde(flatten)]
    pub summary: RunSummary,
    /// Predictions (empty if the run was saved without them)
    pub predictions: Vec<Prediction>,
}

impl RunDetail {
    /// Split a run that has just been assigned `id`.
    #[must_use]
    pub fn from_run(id: i64, run: Run) -> Self {
        Self {
            summary: RunSummary {
                id,
                name: run.name,
                task: run.task,
                config_name: run.config_name,
                config_path: run.config_path,
                started_at: run.started_at,
                completed_at: run.completed_at,
                duration: run.duration,
                metrics: run.metrics,
                artifact_path: run.artifact_path,
            },
            predictions: run.predictions,
        }
    }
}

impl From<RunDetail> for Run {
    fn from(detail: RunDetail) -> Self {
        let RunDetail {
            summary,
            predictions,
        } = detail;
        Self {
            id: Some(summary.id),
            name: summary.name,
            task: summary.task,
            config_name: summary.config_name,
            config_path: summary.config_path,
            started_at: summary.started_at,
            completed_at: summary.completed_at,
            duration: summary.duration,
            metrics: summary.metrics,
            predictions,
            artifact_path: summary.artifact_path,
        }
    }
}

fn ensure_unsaved(run: &Run) -> Result<()> {
    match run.id {
        Some(id) => Err(Error::Storage(format!(
            "run '{}' is already persisted with id {id}",
            run.name
        ))),
        None => Ok(()),
    }
}

/// Most recently completed first; ties broken by newest id.
fn sort_summaries(summaries: &mut [RunSummary]) {
    summaries.sort_by(|a, b| {
        b.completed_at
            .cmp(&a.completed_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
