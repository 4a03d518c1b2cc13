//! Discovery of unit directories.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{RegistryError, UnitConfigError};
use crate::layout::{unit_config_relative, Layout, UNIT_CONFIG_FILE};

use super::config::CIUnitConfig;

/// A unit directory found under the units root. Its config has not been
/// read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredCIUnit {
    pub id: String,
    pub dir: PathBuf,
}

impl RegisteredCIUnit {
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            dir: dir.into(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(UNIT_CONFIG_FILE)
    }

    /// Reads and validates the unit's config file.
    pub fn config(&self) -> Result<CIUnitConfig, UnitConfigError> {
        CIUnitConfig::load(&self.config_path())
    }

    pub fn load(&self) -> Result<CIUnit, UnitConfigError> {
        Ok(CIUnit {
            id: self.id.clone(),
            config: self.config()?,
        })
    }
}

/// A unit with a successfully loaded config.
#[derive(Debug, Clone, PartialEq)]
pub struct CIUnit {
    pub id: String,
    pub config: CIUnitConfig,
}

impl CIUnit {
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    /// Name of the unit's trigger job: `unit:` followed by the id with `.`
    /// replaced by `:`.
    pub fn job_name(&self) -> String {
        format!("unit:{}", self.id.replace('.', ":"))
    }

    /// Config path relative to the project root, as watched for changes.
    pub fn config_relative_path(&self) -> String {
        unit_config_relative(&self.id)
    }

    pub fn registry_path(&self, layout: &Layout) -> PathBuf {
        layout.registry_file(self.provider_name(), &self.id)
    }
}

/// Lists unit directories under the units root, sorted by id.
///
/// A missing units root means there are no units. Hidden directories are
/// skipped.
pub fn discover_units(layout: &Layout) -> Result<Vec<RegisteredCIUnit>, RegistryError> {
    let root = layout.units_root();
    if !root.is_dir() {
        log::debug!("Units directory {:?} does not exist", root);
        return Ok(Vec::new());
    }

    let mut units = Vec::new();
    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| RegistryError::ScanFailed {
            path: root.clone(),
            source: e,
        })?;

        if !entry.file_type().is_dir() || is_hidden(entry.path()) {
            continue;
        }

        let id = entry.file_name().to_string_lossy().into_owned();
        units.push(RegisteredCIUnit::new(id, entry.path()));
    }

    Ok(units)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
