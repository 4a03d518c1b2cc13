//! YAML loading and dumping for GitLab CI files.
//!
//! Documents are handled as plain `serde_yaml` trees. Aliases in the input
//! are expanded by the parser and the emitter never produces anchors, so
//! everything written back out is fully inlined and diffs cleanly.

pub mod reference;

use std::fs;
use std::path::{Path, PathBuf};

pub use reference::{GitLabReference, REFERENCE_TAG};
pub use serde_yaml::{Mapping, Value};

use serde::Deserialize;

use crate::error::YamlError;

/// Top-level key of GitLab's pipeline header document.
pub const SPEC_HEADER_KEY: &str = "spec";

/// Parses a YAML file whose root must be a mapping.
///
/// A leading GitLab `spec:` header document is skipped and the document
/// after it is parsed. Any other multi-document input is rejected. Empty
/// documents (including comment-only files) yield an empty mapping.
pub fn parse_yaml(content: &str, path: &Path) -> Result<Mapping, YamlError> {
    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let parse_err = |e: serde_yaml::Error| YamlError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let multiple_documents = || YamlError::Parse {
        path: path.to_path_buf(),
        message: "expected a single document after the optional spec header".to_string(),
    };

    let mut documents = serde_yaml::Deserializer::from_str(content);
    let first = match documents.next() {
        Some(document) => Value::deserialize(document).map_err(parse_err)?,
        None => Value::Null,
    };

    let value = match documents.next() {
        None => first,
        Some(document) if is_spec_header(&first) => {
            Value::deserialize(document).map_err(parse_err)?
        }
        Some(_) => return Err(multiple_documents()),
    };

    if documents.next().is_some() {
        return Err(multiple_documents());
    }

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => Err(YamlError::NotAMapping {
            path: path.to_path_buf(),
            found: value_kind(&other),
        }),
    }
}

/// A header document holds nothing but the `spec` key.
fn is_spec_header(value: &Value) -> bool {
    match value {
        Value::Mapping(mapping) => mapping.len() == 1 && mapping.contains_key(SPEC_HEADER_KEY),
        _ => false,
    }
}

/// Loads a YAML file from disk. See [`parse_yaml`].
pub fn load_yaml(path: &Path) -> Result<Mapping, YamlError> {
    let content = fs::read_to_string(path).map_err(|e| YamlError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_yaml(&content, path)
}

/// Serializes a mapping, keeping key insertion order.
///
/// With a header, every header line is emitted as a `# ` comment and the
/// document is introduced by an explicit `---` marker.
pub fn to_yaml_string(content: &Mapping, header: Option<&str>) -> Result<String, YamlError> {
    let body =
        serde_yaml::to_string(content).map_err(|e| YamlError::Serialize(e.to_string()))?;

    let Some(header) = header else {
        return Ok(body);
    };

    let mut out = String::with_capacity(header.len() + body.len() + 8);
    for line in header.lines() {
        if line.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str("---\n");
    out.push_str(&body);
    Ok(out)
}

/// Writes a mapping to `path`. See [`to_yaml_string`].
pub fn dump_yaml(content: &Mapping, path: &Path, header: Option<&str>) -> Result<(), YamlError> {
    let text = to_yaml_string(content, header)?;
    fs::write(path, text).map_err(|e| YamlError::Write {
        path: PathBuf::from(path),
        source: e,
    })
}

/// Human readable name of a value's type, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
