//! Deep merge of YAML trees used to combine included fragments.
//!
//! Mappings merge key by key, sequences concatenate (base first), and any
//! other combination is won by the override. Inputs are never mutated.

use serde_yaml::{Mapping, Value};

/// Merges `override_value` on top of `base`.
pub fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Mapping(base), Value::Mapping(other)) => {
            Value::Mapping(merge_mappings(base, other))
        }
        (Value::Sequence(base), Value::Sequence(other)) => {
            let mut merged = Vec::with_capacity(base.len() + other.len());
            merged.extend(base.iter().cloned());
            merged.extend(other.iter().cloned());
            Value::Sequence(merged)
        }
        (_, other) => other.clone(),
    }
}

/// Mapping form of [`deep_merge`]. Keys keep the base order; keys only
/// present in `override_map` are appended in their own order.
pub fn merge_mappings(base: &Mapping, override_map: &Mapping) -> Mapping {
    let mut merged = base.clone();
    for (key, value) in override_map {
        let combined = match merged.get(key) {
            Some(existing) => deep_merge(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parse_yaml;
    use std::path::Path;

    fn yaml(content: &str) -> Mapping {
        parse_yaml(content, Path::new("test.yml")).unwrap()
    }

    #[test]
    fn test_empty_mapping_is_identity() {
        let a = yaml("stages: [build, test]\njob:\n  script: [make]\n  variables:\n    X: 1\n");
        let empty = Mapping::new();

        assert_eq!(merge_mappings(&a, &empty), a);
        assert_eq!(merge_mappings(&empty, &a), a);
    }

    #[test]
    fn test_sequences_concatenate() {
        let merged = merge_mappings(&yaml("k: [1, 2]"), &yaml("k: [3]"));
        assert_eq!(merged, yaml("k: [1, 2, 3]"));
    }

    #[test]
    fn test_sequence_duplicates_are_kept() {
        let merged = merge_mappings(&yaml("stages: [build]"), &yaml("stages: [build]"));
        assert_eq!(merged, yaml("stages: [build, build]"));
    }

    #[test]
    fn test_scalar_override() {
        let merged = merge_mappings(&yaml("k: 1"), &yaml("k: 2"));
        assert_eq!(merged, yaml("k: 2"));
    }

    #[test]
    fn test_type_mismatch_override_wins() {
        let merged = merge_mappings(&yaml("k: [1, 2]"), &yaml("k: {a: 1}"));
        assert_eq!(merged, yaml("k: {a: 1}"));

        let merged = merge_mappings(&yaml("k: {a: 1}"), &yaml("k: plain"));
        assert_eq!(merged, yaml("k: plain"));
    }

    #[test]
    fn test_nested_mappings_merge_recursively() {
        let base = yaml("job:\n  variables:\n    A: 1\n    B: 2\n  script: [one]\n");
        let other = yaml("job:\n  variables:\n    B: 3\n    C: 4\n  script: [two]\n");

        let merged = merge_mappings(&base, &other);
        assert_eq!(
            merged,
            yaml("job:\n  variables:\n    A: 1\n    B: 3\n    C: 4\n  script: [one, two]\n")
        );
    }

    #[test]
    fn test_key_order_base_first() {
        let merged = merge_mappings(&yaml("b: 1\na: 2\n"), &yaml("c: 3\nb: 4\n"));
        let keys: Vec<&str> = merged.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let base = yaml("k: [1]\nm: {x: 1}\n");
        let other = yaml("k: [2]\nm: {y: 2}\n");
        let base_before = base.clone();
        let other_before = other.clone();

        let _ = merge_mappings(&base, &other);

        assert_eq!(base, base_before);
        assert_eq!(other, other_before);
    }

    #[test]
    fn test_non_mapping_values() {
        assert_eq!(
            deep_merge(&Value::from("a"), &Value::from("b")),
            Value::from("b")
        );
        assert_eq!(deep_merge(&Value::Null, &Value::from(1)), Value::from(1));
    }
}
