//! JSON run artifacts
//!
//! A completed run can be dumped next to its config as
//! `<directory>/<run name>_<YYYYmmddTHHMMSS>.json` (pretty-printed). The
//! timestamp is the run's `completed_at`. Existing files are never
//! overwritten: a taken name gets a `_1`, `_2`, ... suffix before `.json`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::runner::Run;
use crate::Result;

/// Write `run` into `directory`, creating it if needed.
///
/// Characters outside `[A-Za-z0-9._-]` in the run name become `_`.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] or [`crate::Error::Json`] on failure.
pub fn write_run_artifact(directory: &Path, run: &Run) -> Result<PathBuf> {
    fs::create_dir_all(directory)?;
    let stem = format!(
        "{}_{}",
        sanitize(&run.name),
        run.completed_at.format("%Y%m%dT%H%M%S")
    );
    let bytes = serde_json::to_vec_pretty(run)?;

    let mut attempt = 0_u32;
    loop {
        let file_name = if attempt == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}_{attempt}.json")
        };
        let path = directory.join(file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(&bytes)?;
                debug!(run = %run.name, path = %path.display(), "Wrote run artifact");
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read a run artifact back.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] or [`crate::Error::Json`] on failure.
pub fn read_run_artifact(path: &Path) -> Result<Run> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
