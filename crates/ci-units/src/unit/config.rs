//! Schema of `ci/units/<id>/config.toml`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::UnitConfigError;

/// A unit's declarative configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "UnitConfigSpec")]
pub struct CIUnitConfig {
    pub name: String,
    pub description: String,
    pub trigger: CIUnitTrigger,
    pub provider: ProviderConfig,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitConfigSpec {
    name: String,
    description: String,
    #[serde(default)]
    trigger: CIUnitTrigger,
    provider: ProviderConfig,
}

impl TryFrom<UnitConfigSpec> for CIUnitConfig {
    type Error = UnitConfigError;

    fn try_from(spec: UnitConfigSpec) -> Result<Self, Self::Error> {
        if spec.name.trim().is_empty() {
            return Err(UnitConfigError::EmptyField { field: "name" });
        }
        if spec.description.trim().is_empty() {
            return Err(UnitConfigError::EmptyField {
                field: "description",
            });
        }

        Ok(Self {
            name: spec.name,
            description: spec.description,
            trigger: spec.trigger,
            provider: spec.provider,
        })
    }
}

impl CIUnitConfig {
    /// Parses a config from TOML text. `path` is only used in errors.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, UnitConfigError> {
        toml::from_str(content).map_err(|e| UnitConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, UnitConfigError> {
        let content = fs::read_to_string(path).map_err(|e| UnitConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content, path)
    }
}

/// When a unit's jobs run.
///
/// Patterns are validated on construction: none may be empty and none may
/// appear twice.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TriggerSpec")]
pub struct CIUnitTrigger {
    patterns: Vec<String>,
    watch_config: bool,
    allow_manual: bool,
    allow_tags: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TriggerSpec {
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default = "default_true")]
    watch_config: bool,
    #[serde(default = "default_true")]
    allow_manual: bool,
    #[serde(default)]
    allow_tags: bool,
}

fn default_true() -> bool {
    true
}

impl TryFrom<TriggerSpec> for CIUnitTrigger {
    type Error = UnitConfigError;

    fn try_from(spec: TriggerSpec) -> Result<Self, Self::Error> {
        Ok(CIUnitTrigger::new(spec.patterns)?
            .with_watch_config(spec.watch_config)
            .with_allow_manual(spec.allow_manual)
            .with_allow_tags(spec.allow_tags))
    }
}

impl Default for CIUnitTrigger {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            watch_config: true,
            allow_manual: true,
            allow_tags: false,
        }
    }
}

impl CIUnitTrigger {
    /// Creates a trigger with default flags.
    ///
    /// Every duplicated pattern is reported together with all of the
    /// indices it occurs at.
    pub fn new(patterns: Vec<String>) -> Result<Self, UnitConfigError> {
        if let Some(index) = patterns.iter().position(|p| p.trim().is_empty()) {
            return Err(UnitConfigError::EmptyPattern { index });
        }

        let duplicates = find_duplicates(&patterns);
        if !duplicates.is_empty() {
            return Err(UnitConfigError::DuplicatePatterns { duplicates });
        }

        Ok(Self {
            patterns,
            ..Self::default()
        })
    }

    pub fn with_watch_config(mut self, watch_config: bool) -> Self {
        self.watch_config = watch_config;
        self
    }

    pub fn with_allow_manual(mut self, allow_manual: bool) -> Self {
        self.allow_manual = allow_manual;
        self
    }

    pub fn with_allow_tags(mut self, allow_tags: bool) -> Self {
        self.allow_tags = allow_tags;
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether the unit's own config file counts as one of its patterns.
    pub fn watch_config(&self) -> bool {
        self.watch_config
    }

    /// Whether the unit can be selected by name or through `all`.
    pub fn allow_manual(&self) -> bool {
        self.allow_manual
    }

    pub fn allow_tags(&self) -> bool {
        self.allow_tags
    }
}

/// Duplicated patterns in order of first occurrence, with all their indices.
fn find_duplicates(patterns: &[String]) -> Vec<(String, Vec<usize>)> {
    let mut occurrences: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for (index, pattern) in patterns.iter().enumerate() {
        let indices = occurrences.entry(pattern.as_str()).or_default();
        if indices.is_empty() {
            order.push(pattern.as_str());
        }
        indices.push(index);
    }

    order
        .into_iter()
        .filter_map(|pattern| {
            let indices = &occurrences[pattern];
            (indices.len() > 1).then(|| (pattern.to_string(), indices.clone()))
        })
        .collect()
}

/// CI provider of a unit, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderConfig {
    #[serde(rename = "gitlab")]
    GitLab(GitLabProviderConfig),
}

impl ProviderConfig {
    /// Name of the provider, used as the registry sub-directory.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::GitLab(_) => "gitlab",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitLabProviderConfig {
    pub pipeline: GitLabPipeline,
}

/// How the unit's downstream pipeline is obtained. The kind is decided by
/// which of `path` or `command` is present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GitLabPipeline {
    Static(StaticGitLabPipeline),
    Dynamic(DynamicGitLabPipeline),
}

impl GitLabPipeline {
    /// Extra GitLab rules placed before the change detection rules.
    pub fn rules(&self) -> &[Value] {
        match self {
            GitLabPipeline::Static(pipeline) => &pipeline.rules,
            GitLabPipeline::Dynamic(pipeline) => &pipeline.rules,
        }
    }
}

/// A pipeline file checked into the repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticGitLabPipeline {
    pub path: String,
    #[serde(default)]
    pub rules: Vec<Value>,
}

/// A pipeline produced at CI time by running `command`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicGitLabPipeline {
    pub command: String,
    #[serde(default)]
    pub rules: Vec<Value>,
}
