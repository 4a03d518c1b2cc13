//! GitLab CI configuration composition.
//!
//! This module turns a tree of GitLab CI files into resolved configurations:
//! - Local `include` expansion with deep merging
//! - Job `extends` inheritance
//! - `!reference` substitution
//! - Discovery of downstream pipelines started by trigger jobs

pub mod extends;
pub mod include;
pub mod reference;
pub mod triggers;

use std::path::{Path, PathBuf};

use serde_yaml::Mapping;

use crate::error::Result;
use crate::yaml::load_yaml;

pub use extends::{resolve_extends, MAX_EXTENDS_DEPTH};
pub use include::{resolve_includes, IncludeResolver};
pub use reference::{resolve_references, MAX_REFERENCE_DEPTH};
pub use triggers::{
    find_triggered_pipelines, get_all_triggered_configurations, get_trigger_filenames,
    SkippedPipeline, TriggeredConfigurations, MAIN_PIPELINE_ID,
};

/// Loads pipeline files and applies every resolution pass.
#[derive(Debug, Clone)]
pub struct PipelineLoader {
    includes: IncludeResolver,
}

impl PipelineLoader {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            includes: IncludeResolver::new(project_root),
        }
    }

    pub fn project_root(&self) -> &Path {
        self.includes.project_root()
    }

    /// Loads `path` (absolute, or relative to the project root) and resolves
    /// its includes, `extends` and `!reference` tags, in that order.
    pub fn load(&self, path: &Path) -> Result<Mapping> {
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root().join(path)
        };

        let content = load_yaml(&full_path)?;
        self.resolve(content, &full_path)
    }

    /// Resolves already parsed `content` that was read from `path`.
    pub fn resolve(&self, content: Mapping, path: &Path) -> Result<Mapping> {
        let base = path.parent().unwrap_or(self.project_root());
        let included = self.includes.resolve(content, base)?;
        let extended = resolve_extends(&included)?;
        Ok(resolve_references(&extended)?)
    }

    /// Resolves the pipeline at `path` and every pipeline it triggers.
    pub fn load_all(&self, path: &Path) -> Result<TriggeredConfigurations> {
        let main = self.load(path)?;
        Ok(get_all_triggered_configurations(
            main,
            |triggered| self.load(triggered),
            self.project_root(),
        ))
    }
}
