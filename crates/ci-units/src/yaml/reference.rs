//! The GitLab `!reference [job, key, ...]` tag.

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::Value;

use crate::error::ResolveError;

/// YAML tag used by GitLab to borrow a field from another job.
pub const REFERENCE_TAG: &str = "!reference";

/// The sequence argument of a `!reference` tag.
///
/// This is a plain data holder. Parsed documents keep references as
/// `Value::Tagged` nodes so they pass through merging and dumping verbatim;
/// this type is the typed view used when a consumer wants to inspect or
/// resolve them.
#[derive(Debug, Clone, PartialEq)]
pub struct GitLabReference {
    pub items: Vec<Value>,
}

impl GitLabReference {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Builds a reference from string path segments.
    pub fn from_path<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(path.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Returns the reference carried by `value`, if it is a `!reference` node.
    ///
    /// A `!reference` tag on anything other than a sequence is not a valid
    /// reference and yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Tagged(tagged) if is_reference_tag(&tagged.tag) => match &tagged.value {
                Value::Sequence(items) => Some(Self::new(items.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether `value` is tagged with `!reference`, regardless of its payload.
    pub fn is_reference(value: &Value) -> bool {
        matches!(value, Value::Tagged(tagged) if is_reference_tag(&tagged.tag))
    }

    /// The path segments as strings.
    pub fn keys(&self) -> Result<Vec<String>, ResolveError> {
        if self.items.is_empty() {
            return Err(ResolveError::InvalidReference(
                "reference path must not be empty".to_string(),
            ));
        }

        self.items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ResolveError::InvalidReference(format!(
                    "path segments must be strings, found {}",
                    crate::yaml::value_kind(other)
                ))),
            })
            .collect()
    }

    pub fn into_value(self) -> Value {
        Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(REFERENCE_TAG),
            value: Value::Sequence(self.items),
        }))
    }
}

impl From<GitLabReference> for Value {
    fn from(reference: GitLabReference) -> Self {
        reference.into_value()
    }
}

fn is_reference_tag(tag: &Tag) -> bool {
    *tag == REFERENCE_TAG
}
