//! In-memory run store

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use super::{ensure_unsaved, sort_summaries, RunDetail, RunStore, RunSummary};
use crate::runner::Run;
use crate::{Error, Result};

/// Run store held in a concurrent map; contents vanish with the process.
///
/// Ids are handed out from an atomic counter starting at 1, so concurrent
/// saves never collide.
#[derive(Debug)]
pub struct MemoryRunStore {
    runs: DashMap<i64, RunDetail>,
    next_id: AtomicI64,
}

impl MemoryRunStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStore for MemoryRunStore {
    fn save(&self, mut run: Run) -> Result<Run> {
        ensure_unsaved(&run)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        run.id = Some(id);
        self.runs.insert(id, RunDetail::from_run(id, run.clone()));
        debug!(id, run = %run.name, "Saved run in memory");
        Ok(run)
    }

    fn list(&self) -> Result<Vec<RunSummary>> {
        let mut summaries: Vec<RunSummary> = self
            .runs
            .iter()
            .map(|entry| entry.value().summary.clone())
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    fn get(&self, id: i64) -> Result<RunDetail> {
        self.runs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::RunNotFound(id))
    }
}
