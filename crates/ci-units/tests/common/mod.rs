//! Shared test utilities for ci-units integration tests.
//!
//! `TestProject` creates an isolated repository layout in a temp directory
//! with helpers to add unit configs, registry files and pipeline files.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use ci_units::layout::Layout;

/// Root pipeline with a units regex that matches no configured unit.
pub const ROOT_PIPELINE: &str = "spec:
  inputs:
    units:
      description: Comma separated unit ids, or all
      default: all
      regex: ^(all)$
---

stages: [units]

include:
  - local: .ci/units/**/*.yml
";

/// Isolated project directory.
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    /// Creates an empty project.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Creates a project with the default root pipeline.
    pub fn with_root_pipeline() -> Self {
        let project = Self::new();
        project.write(".gitlab-ci.yml", ROOT_PIPELINE);
        project
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.root())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Writes a file relative to the project root, creating parents.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("Failed to read file")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Adds a unit with a static pipeline.
    pub fn add_static_unit(&self, id: &str, patterns: &[&str]) -> PathBuf {
        self.add_unit(id, &unit_config(id, patterns, "path = \"ci/pipelines/unit.yml\""))
    }

    /// Adds a unit with a dynamic pipeline.
    pub fn add_dynamic_unit(&self, id: &str, patterns: &[&str]) -> PathBuf {
        self.add_unit(id, &unit_config(id, patterns, "command = \"tools/generate\""))
    }

    /// Adds a unit with a raw `config.toml`.
    pub fn add_unit(&self, id: &str, config: &str) -> PathBuf {
        self.write(&format!("ci/units/{}/config.toml", id), config)
    }

    /// Relative path of a unit's GitLab registry file.
    pub fn registry_file(id: &str) -> String {
        format!(".ci/units/gitlab/{}.yml", id)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A valid unit config with the given pipeline table body.
pub fn unit_config(id: &str, patterns: &[&str], pipeline: &str) -> String {
    let patterns: Vec<String> = patterns.iter().map(|p| format!("\"{}\"", p)).collect();
    format!(
        "name = \"Unit {id}\"\ndescription = \"Test unit {id}\"\n\n[trigger]\npatterns = [{patterns}]\n\n[provider]\ntype = \"gitlab\"\n\n[provider.pipeline]\n{pipeline}\n",
        id = id,
        patterns = patterns.join(", "),
        pipeline = pipeline,
    )
}
