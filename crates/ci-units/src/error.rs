use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiUnitsError {
    #[error("YAML error: {0}")]
    Yaml(#[from] YamlError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Unit configuration error: {0}")]
    UnitConfig(#[from] UnitConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug)]
pub enum YamlError {
    #[error("Failed to read file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize YAML: {0}")]
    Serialize(String),

    #[error("Expected a mapping at the root of '{path}', found {found}")]
    NotAMapping { path: PathBuf, found: &'static str },
}

impl From<serde_yaml::Error> for YamlError {
    fn from(err: serde_yaml::Error) -> Self {
        YamlError::Parse {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

/// Errors raised while expanding `extends` and `!reference` directives.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Job '{job}' extends unknown job '{parent}'")]
    UnknownExtends { job: String, parent: String },

    #[error("Circular extends chain: {}", .chain.join(" -> "))]
    ExtendsCycle { chain: Vec<String> },

    #[error("Job '{job}' exceeds the maximum extends depth of {limit}")]
    ExtendsTooDeep { job: String, limit: usize },

    #[error("Job '{job}' has an invalid extends value: {reason}")]
    InvalidExtends { job: String, reason: String },

    #[error("Reference !reference [{}] does not resolve to a value", .path.join(", "))]
    UnknownReference { path: Vec<String> },

    #[error("Invalid !reference: {0}")]
    InvalidReference(String),

    #[error("!reference nesting exceeds the maximum depth of {limit}")]
    ReferenceTooDeep { limit: usize },
}

#[derive(Error, Debug)]
pub enum UnitConfigError {
    #[error("Failed to read unit config '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse unit config '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Field '{field}' must not be empty")]
    EmptyField { field: &'static str },

    #[error("Trigger pattern at index {index} must not be empty")]
    EmptyPattern { index: usize },

    #[error("Duplicate trigger patterns: {}", format_duplicates(.duplicates))]
    DuplicatePatterns { duplicates: Vec<(String, Vec<usize>)> },
}

fn format_duplicates(duplicates: &[(String, Vec<usize>)]) -> String {
    duplicates
        .iter()
        .map(|(pattern, indices)| {
            let indices: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
            format!("'{}' at indices {}", pattern, indices.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan directory '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Could not find the spec.inputs.units.regex field in '{0}'")]
    MissingUnitsRegex(PathBuf),
}

pub type Result<T> = std::result::Result<T, CiUnitsError>;
