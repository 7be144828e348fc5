//! Named config presets
//!
//! Maps short identifiers such as `sentiment-keyword` to config files, and
//! falls back to treating an identifier as a path relative to the catalog's
//! base directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{resolve_config, ConfigSpec};
use crate::{Error, Result};

/// One listed config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Preset name
    pub name: String,
    /// Config file path
    pub path: String,
    /// Human-readable description
    pub description: String,
}

/// Preset name -> config path.
#[derive(Debug, Clone, Default)]
pub struct ConfigCatalog {
    base_dir: PathBuf,
    presets: BTreeMap<String, PathBuf>,
}

impl ConfigCatalog {
    /// Empty catalog resolving relative identifiers against `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            presets: BTreeMap::new(),
        }
    }

    /// Catalog of every `*.json` file in `dir`.
    ///
    /// Preset names are file stems with `_` replaced by `-`
    /// (`sentiment_keyword.json` -> `sentiment-keyword`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if `dir` cannot be read.
    pub fn discover(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut catalog = Self::new(dir);
        for entry in std::fs::read_dir(&catalog.base_dir)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if !is_json || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                let name = stem.replace('_', "-");
                debug!(preset = %name, path = %path.display(), "Discovered config");
                catalog.presets.insert(name, path);
            }
        }
        Ok(catalog)
    }

    /// Add (or replace) a preset. Relative paths are anchored at the base dir.
    #[must_use]
    pub fn with_preset(mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        self.presets.insert(name.into(), path);
        self
    }

    /// Base directory for relative identifiers.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Presets, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ConfigInfo> {
        self.presets
            .iter()
            .map(|(name, path)| ConfigInfo {
                name: name.clone(),
                path: path.display().to_string(),
                description: format!("Preset config located at {}", path.display()),
            })
            .collect()
    }

    /// Find the config file for `identifier`: a preset name, else a path
    /// (absolute, or relative to the base dir, or relative to the working
    /// directory).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] if nothing matches.
    pub fn locate(&self, identifier: &str) -> Result<PathBuf> {
        if let Some(path) = self.presets.get(identifier) {
            return Ok(path.clone());
        }

        let candidate = Path::new(identifier);
        let candidates = if candidate.is_absolute() {
            vec![candidate.to_path_buf()]
        } else {
            vec![self.base_dir.join(candidate), candidate.to_path_buf()]
        };
        candidates
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| Error::ConfigNotFound(identifier.to_string()))
    }

    /// Locate and load the config for `identifier`.
    ///
    /// The loaded spec's `config_name` is the identifier itself, so runs
    /// started from a preset are listed under the preset name.
    ///
    /// # Errors
    ///
    /// See [`Self::locate`] and [`resolve_config`].
    pub fn load(&self, identifier: &str) -> Result<ConfigSpec> {
        let path = self.locate(identifier)?;
        let mut spec = resolve_config(path)?;
        spec.config_name = identifier.to_string();
        Ok(spec)
    }
}
