//! Recursive resolution of GitLab `include` directives.
//!
//! Only local includes are handled: bare strings and `{local: path}` entries,
//! either literal paths or glob patterns. Remote, template and cross-project
//! includes are skipped. Paths are relative to the project root, with an
//! optional leading `/` as GitLab allows.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde_yaml::{Mapping, Value};

use crate::error::YamlError;
use crate::merge::merge_mappings;
use crate::yaml::load_yaml;

const INCLUDE_KEY: &str = "include";
const LOCAL_KEY: &str = "local";

/// Resolves `include` directives of `content`, which was read from a file in
/// `base_path`. See [`IncludeResolver::resolve`].
pub fn resolve_includes(
    content: Mapping,
    base_path: &Path,
    project_root: &Path,
) -> Result<Mapping, YamlError> {
    IncludeResolver::new(project_root).resolve(content, base_path)
}

/// Expands local includes against a fixed project root.
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    project_root: PathBuf,
}

impl IncludeResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns `content` with its includes merged in.
    ///
    /// Included files are resolved recursively and merged in listing order;
    /// the including file's own keys are merged last and win. Includes that
    /// match no existing file contribute nothing.
    pub fn resolve(&self, content: Mapping, base_path: &Path) -> Result<Mapping, YamlError> {
        let _span = tracing::debug_span!("pipeline.include", base = %base_path.display()).entered();
        let mut active = Vec::new();
        self.resolve_inner(content, base_path, &mut active)
    }

    fn resolve_inner(
        &self,
        mut content: Mapping,
        base_path: &Path,
        active: &mut Vec<PathBuf>,
    ) -> Result<Mapping, YamlError> {
        let Some(include) = content.shift_remove(INCLUDE_KEY) else {
            return Ok(content);
        };

        let mut merged = Mapping::new();
        for entry in normalize_includes(include) {
            for path in self.include_paths(&entry) {
                if active.contains(&path) {
                    log::warn!(
                        "Skipping recursive include of '{}' from '{}'",
                        path.display(),
                        base_path.display()
                    );
                    continue;
                }

                let included = load_yaml(&path)?;
                let parent = path.parent().unwrap_or(&self.project_root).to_path_buf();

                active.push(path.clone());
                let resolved = self.resolve_inner(included, &parent, active);
                active.pop();

                merged = merge_mappings(&merged, &resolved?);
            }
        }

        Ok(merge_mappings(&merged, &content))
    }

    /// Concrete files an include entry refers to, sorted for glob patterns.
    fn include_paths(&self, entry: &Value) -> Vec<PathBuf> {
        let location = match entry {
            Value::String(location) => location.as_str(),
            Value::Mapping(mapping) => match mapping.get(LOCAL_KEY).and_then(Value::as_str) {
                Some(location) => location,
                None => {
                    log::debug!("Skipping non-local include: {:?}", entry);
                    return Vec::new();
                }
            },
            other => {
                log::debug!("Skipping unsupported include entry: {:?}", other);
                return Vec::new();
            }
        };

        let relative = location.trim_start_matches('/');
        if is_glob(relative) {
            self.expand_glob(relative)
        } else {
            let path = self.project_root.join(relative);
            if path.is_file() {
                vec![path]
            } else {
                log::debug!("Include '{}' does not exist, ignoring", location);
                Vec::new()
            }
        }
    }

    fn expand_glob(&self, relative: &str) -> Vec<PathBuf> {
        let root = Pattern::escape(&self.project_root.to_string_lossy());
        let pattern = format!("{}/{}", root.trim_end_matches('/'), relative);
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let entries = match glob::glob_with(&pattern, options) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Invalid include pattern '{}': {}", relative, e);
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();
        paths
    }
}

/// A single include entry or a list of them becomes a list.
fn normalize_includes(include: Value) -> Vec<Value> {
    match include {
        Value::Sequence(entries) => entries,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parse_yaml;
    use std::fs;
    use tempfile::TempDir;

    fn yaml(content: &str) -> Mapping {
        parse_yaml(content, Path::new("test.yml")).unwrap()
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_no_include_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let content = yaml("stages: [build]\njob:\n  script: [make]\n");
        let resolved = resolve_includes(content.clone(), dir.path(), dir.path()).unwrap();
        assert_eq!(resolved, content);
    }

    #[test]
    fn test_missing_include_is_silent() {
        let dir = TempDir::new().unwrap();
        let resolved =
            resolve_includes(yaml("include: nonexistent.yml"), dir.path(), dir.path()).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_local_include_and_own_keys_win() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "ci/base.yml",
            "variables:\n  A: base\n  B: base\nstages: [build]\n",
        );

        let content = yaml("include:\n  - local: /ci/base.yml\nvariables:\n  A: own\nstages: [test]\n");
        let resolved = resolve_includes(content, dir.path(), dir.path()).unwrap();

        assert_eq!(
            resolved,
            yaml("variables:\n  A: own\n  B: base\nstages: [build, test]\n")
        );
    }

    #[test]
    fn test_bare_string_and_mapping_forms() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yml", "a: 1\n");
        write(dir.path(), "b.yml", "b: 2\n");

        let resolved =
            resolve_includes(yaml("include: a.yml"), dir.path(), dir.path()).unwrap();
        assert_eq!(resolved, yaml("a: 1"));

        let resolved =
            resolve_includes(yaml("include:\n  local: b.yml\n"), dir.path(), dir.path()).unwrap();
        assert_eq!(resolved, yaml("b: 2"));
    }

    #[test]
    fn test_glob_include_sorted_and_overridden() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ci/shared/b.yml", "variables:\n  Y: 2\n");
        write(dir.path(), "ci/shared/a.yml", "variables:\n  X: 1\n");
        write(dir.path(), "ci/shared/nested/c.yml", "variables:\n  Z: 3\n");

        let content = yaml("include: ci/shared/*.yml\nvariables:\n  X: 99\n");
        let resolved = resolve_includes(content, dir.path(), dir.path()).unwrap();

        assert_eq!(resolved, yaml("variables:\n  X: 99\n  Y: 2\n"));
    }

    #[test]
    fn test_recursive_glob_include() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ci/a/one.yml", "one: 1\n");
        write(dir.path(), "ci/a/b/two.yml", "two: 2\n");

        let resolved =
            resolve_includes(yaml("include: ci/**/*.yml"), dir.path(), dir.path()).unwrap();
        assert_eq!(resolved.get("one"), Some(&Value::from(1)));
        assert_eq!(resolved.get("two"), Some(&Value::from(2)));
    }

    #[test]
    fn test_nested_includes_resolve_from_project_root() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ci/first.yml", "include: ci/second.yml\nfirst: true\n");
        write(dir.path(), "ci/second.yml", "second: true\n");

        let resolved =
            resolve_includes(yaml("include: ci/first.yml"), dir.path(), dir.path()).unwrap();
        assert_eq!(resolved, yaml("second: true\nfirst: true\n"));
    }

    #[test]
    fn test_remote_and_project_includes_are_skipped() {
        let dir = TempDir::new().unwrap();
        let content = yaml(
            "include:\n  - remote: https://example.com/ci.yml\n  - project: group/repo\n    file: ci.yml\n  - template: Auto-DevOps.gitlab-ci.yml\nkeep: me\n",
        );
        let resolved = resolve_includes(content, dir.path(), dir.path()).unwrap();
        assert_eq!(resolved, yaml("keep: me"));
    }

    #[test]
    fn test_recursive_include_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yml", "include: b.yml\na: 1\n");
        write(dir.path(), "b.yml", "include: a.yml\nb: 2\n");

        let resolved =
            resolve_includes(yaml("include: a.yml"), dir.path(), dir.path()).unwrap();
        assert_eq!(resolved, yaml("b: 2\na: 1\n"));
    }

    #[test]
    fn test_malformed_include_is_an_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.yml", "key: [unterminated\n");

        let result = resolve_includes(yaml("include: broken.yml"), dir.path(), dir.path());
        assert!(matches!(result, Err(YamlError::Parse { .. })));
    }
}
