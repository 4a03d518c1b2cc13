//! Expansion of job-level `extends`.
//!
//! Follows GitLab's rules: parents are applied in listing order and the job's
//! own keys last. Mappings merge recursively; every other value, sequences
//! included, is replaced rather than concatenated.

use std::collections::HashMap;

use serde_yaml::{Mapping, Value};

use crate::error::ResolveError;

const EXTENDS_KEY: &str = "extends";

/// GitLab rejects inheritance chains deeper than this.
pub const MAX_EXTENDS_DEPTH: usize = 11;

/// Returns `config` with every `extends` expanded and removed.
pub fn resolve_extends(config: &Mapping) -> Result<Mapping, ResolveError> {
    let mut resolver = ExtendsResolver {
        config,
        resolved: HashMap::new(),
    };

    let mut output = Mapping::with_capacity(config.len());
    for (key, value) in config {
        let resolved = match (key.as_str(), value) {
            (Some(name), Value::Mapping(job)) if job.contains_key(EXTENDS_KEY) => {
                Value::Mapping(resolver.resolve_job(name, &mut Vec::new())?)
            }
            _ => value.clone(),
        };
        output.insert(key.clone(), resolved);
    }
    Ok(output)
}

struct ExtendsResolver<'a> {
    config: &'a Mapping,
    /// Resolved jobs with the length of their inheritance chain.
    resolved: HashMap<String, (Mapping, usize)>,
}

impl ExtendsResolver<'_> {
    fn resolve_job(
        &mut self,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<Mapping, ResolveError> {
        self.resolve_with_depth(name, chain).map(|(job, _)| job)
    }

    fn resolve_with_depth(
        &mut self,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<(Mapping, usize), ResolveError> {
        if let Some(done) = self.resolved.get(name) {
            return Ok(done.clone());
        }

        if chain.iter().any(|entry| entry == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(ResolveError::ExtendsCycle { chain: cycle });
        }

        let config = self.config;
        let job = match config.get(name) {
            Some(Value::Mapping(job)) => job,
            Some(_) => {
                return Err(ResolveError::InvalidExtends {
                    job: name.to_string(),
                    reason: "extended entry is not a job mapping".to_string(),
                })
            }
            None => {
                return Err(ResolveError::UnknownExtends {
                    job: chain.last().cloned().unwrap_or_default(),
                    parent: name.to_string(),
                })
            }
        };

        let parents = match job.get(EXTENDS_KEY) {
            Some(value) => parent_names(name, value)?,
            None => Vec::new(),
        };

        chain.push(name.to_string());
        let mut base = Mapping::new();
        let mut depth = 0;
        for parent in &parents {
            let (parent_job, parent_depth) = self.resolve_with_depth(parent, chain)?;
            base = merge_hashes(&base, &parent_job);
            depth = depth.max(parent_depth + 1);
        }
        chain.pop();

        if depth > MAX_EXTENDS_DEPTH {
            return Err(ResolveError::ExtendsTooDeep {
                job: name.to_string(),
                limit: MAX_EXTENDS_DEPTH,
            });
        }

        let mut own = job.clone();
        own.shift_remove(EXTENDS_KEY);
        let merged = merge_hashes(&base, &own);

        self.resolved.insert(name.to_string(), (merged.clone(), depth));
        Ok((merged, depth))
    }
}

fn parent_names(job: &str, value: &Value) -> Result<Vec<String>, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidExtends {
        job: job.to_string(),
        reason: reason.to_string(),
    };

    match value {
        Value::String(parent) => Ok(vec![parent.clone()]),
        Value::Sequence(parents) => parents
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("list entries must be job names"))
            })
            .collect(),
        _ => Err(invalid("expected a job name or a list of job names")),
    }
}

/// GitLab's `extends` merge: only mappings are merged.
fn merge_hashes(base: &Mapping, other: &Mapping) -> Mapping {
    let mut merged = base.clone();
    for (key, value) in other {
        let combined = match (merged.get(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                Value::Mapping(merge_hashes(existing, incoming))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}
