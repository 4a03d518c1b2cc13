//! Substitution of `!reference [job, key, ...]` tags.

use serde_yaml::{Mapping, Value};

use crate::error::ResolveError;
use crate::yaml::GitLabReference;

/// Maximum number of nested `!reference` hops.
pub const MAX_REFERENCE_DEPTH: usize = 10;

/// Replaces every `!reference` in `config` with the value it points to.
///
/// Lookups run against `config` itself, so callers normally expand
/// `extends` first. A reference inside a sequence that resolves to a
/// sequence is spliced into the surrounding sequence.
pub fn resolve_references(config: &Mapping) -> Result<Mapping, ResolveError> {
    let mut output = Mapping::with_capacity(config.len());
    for (key, value) in config {
        output.insert(key.clone(), resolve_value(value, config, 0)?);
    }
    Ok(output)
}

fn resolve_value(value: &Value, root: &Mapping, depth: usize) -> Result<Value, ResolveError> {
    match value {
        Value::Tagged(_) if GitLabReference::is_reference(value) => {
            let target = lookup(value, root)?;
            if depth >= MAX_REFERENCE_DEPTH {
                return Err(ResolveError::ReferenceTooDeep {
                    limit: MAX_REFERENCE_DEPTH,
                });
            }
            resolve_value(target, root, depth + 1)
        }
        Value::Sequence(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                let is_reference = GitLabReference::is_reference(item);
                match resolve_value(item, root, depth)? {
                    Value::Sequence(spliced) if is_reference => resolved.extend(spliced),
                    other => resolved.push(other),
                }
            }
            Ok(Value::Sequence(resolved))
        }
        Value::Mapping(mapping) => {
            let mut resolved = Mapping::with_capacity(mapping.len());
            for (key, item) in mapping {
                resolved.insert(key.clone(), resolve_value(item, root, depth)?);
            }
            Ok(Value::Mapping(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn lookup<'a>(value: &Value, root: &'a Mapping) -> Result<&'a Value, ResolveError> {
    let reference = GitLabReference::from_value(value).ok_or_else(|| {
        ResolveError::InvalidReference("the tag argument must be a sequence".to_string())
    })?;
    let keys = reference.keys()?;

    let mut current: Option<&Value> = root.get(keys[0].as_str());
    for key in &keys[1..] {
        current = current
            .and_then(Value::as_mapping)
            .and_then(|mapping| mapping.get(key.as_str()));
    }

    current.ok_or(ResolveError::UnknownReference { path: keys })
}
