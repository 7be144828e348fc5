//! SQLite-backed run store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use super::schema::{init_schema, BUSY_TIMEOUT_MS};
use super::{ensure_unsaved, RunDetail, RunStore, RunSummary};
use crate::runner::Run;
use crate::{Error, Result};

const SUMMARY_COLUMNS: &str = "id, name, task, config_name, config_path, started_at, \
                               completed_at, duration, metrics_json, artifact_path";

/// Run store on a single SQLite database.
///
/// Writes go through one connection behind a mutex, so concurrent `save`
/// calls are serialized at the storage boundary. File databases get a
/// second, read-only connection; in WAL mode its reads never wait on the
/// writer.
pub struct SqliteRunStore {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteRunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRunStore")
            .field("separate_reader", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}

impl SqliteRunStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Sqlite`] if the database cannot be
    /// opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        init_schema(&writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;

        info!(path = %path.display(), "Opened run store");
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
        })
    }

    /// Private in-memory database; reads share the writer connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sqlite`] if initialization fails.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        init_schema(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: None,
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| Error::Storage("run store writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        match &self.reader {
            Some(reader) => reader
                .lock()
                .map_err(|_| Error::Storage("run store reader lock poisoned".to_string())),
            None => self.writer(),
        }
    }
}

impl RunStore for SqliteRunStore {
    fn save(&self, mut run: Run) -> Result<Run> {
        ensure_unsaved(&run)?;
        let metrics_json = serde_json::to_string(&run.metrics)?;
        let predictions_json = serde_json::to_string(&run.predictions)?;

        let id = {
            let conn = self.writer()?;
            conn.execute(
                "INSERT INTO runs (
                    name, task, config_name, config_path, started_at, completed_at,
                    duration, metrics_json, predictions_json, artifact_path
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    run.name,
                    run.task,
                    run.config_name,
                    run.config_path,
                    format_timestamp(run.started_at),
                    format_timestamp(run.completed_at),
                    run.duration,
                    metrics_json,
                    predictions_json,
                    run.artifact_path,
                ],
            )?;
            conn.last_insert_rowid()
        };

        debug!(id, run = %run.name, predictions = run.predictions.len(), "Saved run");
        run.id = Some(id);
        Ok(run)
    }

    fn list(&self) -> Result<Vec<RunSummary>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM runs ORDER BY completed_at DESC, id DESC"
        ))?;
        let summaries = stmt
            .query_map([], summary_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    fn get(&self, id: i64) -> Result<RunDetail> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS}, predictions_json FROM runs WHERE id = ?1"
        ))?;
        let detail = stmt
            .query_row(params![id], |row| {
                Ok(RunDetail {
                    summary: summary_from_row(row)?,
                    predictions: parse_json_field(row, 10, "predictions_json")?,
                })
            })
            .optional()?;
        detail.ok_or(Error::RunNotFound(id))
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<RunSummary> {
    Ok(RunSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        task: row.get(2)?,
        config_name: row.get(3)?,
        config_path: row.get(4)?,
        started_at: parse_timestamp(row, 5, "started_at")?,
        completed_at: parse_timestamp(row, 6, "completed_at")?,
        duration: row.get(7)?,
        metrics: parse_json_field(row, 8, "metrics_json")?,
        artifact_path: row.get(9)?,
    })
}

fn parse_json_field<T>(row: &Row<'_>, idx: usize, column_name: &str) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let json: String = row.get(idx)?;
    serde_json::from_str(&json).map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, column_name.to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize, column_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(idx, column_name.to_string(), rusqlite::types::Type::Text)
        })
}
