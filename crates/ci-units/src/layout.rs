//! Locations of unit configs, registry files and the root pipeline.

use std::path::{Path, PathBuf};

/// Environment variable overriding the project root.
pub const PROJECT_ROOT_ENV: &str = "CI_UNITS_PROJECT_ROOT";

/// Directory holding one sub-directory per unit.
pub const UNITS_DIR: &str = "ci/units";

/// Config file name inside a unit directory.
pub const UNIT_CONFIG_FILE: &str = "config.toml";

/// Directory holding generated registry files, one sub-directory per provider.
pub const REGISTRY_DIR: &str = ".ci/units";

/// Extension of generated registry files.
pub const REGISTRY_EXTENSION: &str = "yml";

/// The root GitLab pipeline.
pub const ROOT_PIPELINE: &str = ".gitlab-ci.yml";

/// Project-relative path of a unit's config, with forward slashes.
pub fn unit_config_relative(unit_id: &str) -> String {
    format!("{}/{}/{}", UNITS_DIR, unit_id, UNIT_CONFIG_FILE)
}

/// Repository layout rooted at a project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    project_root: PathBuf,
}

impl Layout {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn units_root(&self) -> PathBuf {
        self.project_root.join(UNITS_DIR)
    }

    pub fn registry_root(&self) -> PathBuf {
        self.project_root.join(REGISTRY_DIR)
    }

    pub fn root_pipeline(&self) -> PathBuf {
        self.project_root.join(ROOT_PIPELINE)
    }

    pub fn unit_config(&self, unit_id: &str) -> PathBuf {
        self.units_root().join(unit_id).join(UNIT_CONFIG_FILE)
    }

    /// Registry file of a unit: `.ci/units/<provider>/<unit-id>.yml`.
    pub fn registry_file(&self, provider: &str, unit_id: &str) -> PathBuf {
        self.registry_root()
            .join(provider)
            .join(format!("{}.{}", unit_id, REGISTRY_EXTENSION))
    }

    /// `path` relative to the project root when it lies inside it.
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = Layout::new("/repo");

        assert_eq!(layout.units_root(), PathBuf::from("/repo/ci/units"));
        assert_eq!(layout.root_pipeline(), PathBuf::from("/repo/.gitlab-ci.yml"));
        assert_eq!(
            layout.unit_config("lint.rust"),
            PathBuf::from("/repo/ci/units/lint.rust/config.toml")
        );
        assert_eq!(
            unit_config_relative("lint.rust"),
            "ci/units/lint.rust/config.toml"
        );
        assert_eq!(
            layout.registry_file("gitlab", "lint.rust"),
            PathBuf::from("/repo/.ci/units/gitlab/lint.rust.yml")
        );
    }

    #[test]
    fn test_relative_path() {
        let layout = Layout::new("/repo");
        assert_eq!(
            layout.relative_path(Path::new("/repo/.ci/units/gitlab/a.yml")),
            PathBuf::from(".ci/units/gitlab/a.yml")
        );
        assert_eq!(
            layout.relative_path(Path::new("/elsewhere/x")),
            PathBuf::from("/elsewhere/x")
        );
    }
}
