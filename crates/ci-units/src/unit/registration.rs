//! Generation of a unit's registry file.
//!
//! Each unit becomes one trigger job (static pipelines) or a generate job
//! plus a trigger job (dynamic pipelines). The jobs extend templates that
//! are defined in the root pipeline, so only unit-specific values are
//! written here.

use std::cmp::Reverse;

use serde_yaml::{Mapping, Value};

use crate::error::YamlError;
use crate::yaml::to_yaml_string;

use super::config::{GitLabPipeline, ProviderConfig};
use super::registered::CIUnit;

/// Banner written at the top of every registry file.
pub const GENERATED_BANNER: &str = "This file is generated by `ci-units check --fix`. Do not edit it by hand;\nupdate ci/units/<id>/config.toml and re-run the command instead.";

/// Pipeline variable used to select units by hand.
pub const UNITS_VARIABLE: &str = "$UNITS";

/// Base ref compared against outside of long-lived branches.
pub const BASE_REF_VARIABLE: &str = "$UNITS_BASE_REF";

pub const PREVIOUS_COMMIT_VARIABLE: &str = "$CI_COMMIT_BEFORE_SHA";

/// GitLab refuses more paths than this in a single `changes` clause.
pub const MAX_CHANGES_PATHS_PER_RULE: usize = 50;

pub const BASE_TEMPLATE: &str = ".job:unit:base";
pub const STATIC_TRIGGER_TEMPLATE: &str = ".job:unit:static:trigger";
pub const DYNAMIC_GENERATE_TEMPLATE: &str = ".job:unit:dynamic:generate";
pub const DYNAMIC_TRIGGER_TEMPLATE: &str = ".job:unit:dynamic:trigger";

/// Artifact produced by a generate job.
pub const GENERATED_PIPELINE_ARTIFACT: &str = "pipeline.yml";

const LONG_LIVED_BRANCH: &str =
    r#"$CI_COMMIT_BRANCH == "main" || $CI_COMMIT_BRANCH =~ /^[0-9]+\.[0-9]+\.x$/"#;
const OTHER_BRANCH: &str =
    r#"$CI_COMMIT_BRANCH != "main" && $CI_COMMIT_BRANCH !~ /^[0-9]+\.[0-9]+\.x$/"#;

/// Renders the registry file of `unit`, banner included.
pub fn unit_registration(unit: &CIUnit) -> Result<String, YamlError> {
    let _span = tracing::debug_span!("unit.registration", unit = %unit.id).entered();

    let rules = unit_rules(unit);
    let job_name = unit.job_name();

    let mut jobs = Mapping::new();
    match &unit.config.provider {
        ProviderConfig::GitLab(gitlab) => match &gitlab.pipeline {
            GitLabPipeline::Static(pipeline) => {
                let mut job = Mapping::new();
                job.insert(
                    "extends".into(),
                    string_list(&[BASE_TEMPLATE, STATIC_TRIGGER_TEMPLATE]),
                );
                job.insert("variables".into(), unit_variables(unit, None));
                job.insert(
                    "trigger".into(),
                    single_entry(
                        "include",
                        Value::Sequence(vec![single_entry(
                            "local",
                            Value::from(pipeline.path.as_str()),
                        )]),
                    ),
                );
                job.insert("rules".into(), Value::Sequence(rules));
                jobs.insert(job_name.into(), Value::Mapping(job));
            }
            GitLabPipeline::Dynamic(pipeline) => {
                let generate_name = format!("{}:generate", job_name);

                let mut generate = Mapping::new();
                generate.insert(
                    "extends".into(),
                    string_list(&[BASE_TEMPLATE, DYNAMIC_GENERATE_TEMPLATE]),
                );
                generate.insert(
                    "variables".into(),
                    unit_variables(unit, Some(pipeline.command.as_str())),
                );
                generate.insert("rules".into(), Value::Sequence(rules));

                let mut need = Mapping::new();
                need.insert("job".into(), Value::from(generate_name.as_str()));
                need.insert("artifacts".into(), Value::Bool(true));

                let mut include = Mapping::new();
                include.insert("artifact".into(), Value::from(GENERATED_PIPELINE_ARTIFACT));
                include.insert("job".into(), Value::from(generate_name.as_str()));

                let mut trigger = Mapping::new();
                trigger.insert(
                    "extends".into(),
                    string_list(&[BASE_TEMPLATE, DYNAMIC_TRIGGER_TEMPLATE]),
                );
                trigger.insert("variables".into(), unit_variables(unit, None));
                trigger.insert("needs".into(), Value::Sequence(vec![Value::Mapping(need)]));
                trigger.insert(
                    "trigger".into(),
                    single_entry("include", Value::Sequence(vec![Value::Mapping(include)])),
                );

                jobs.insert(generate_name.into(), Value::Mapping(generate));
                jobs.insert(job_name.into(), Value::Mapping(trigger));
            }
        },
    }

    to_yaml_string(&jobs, Some(GENERATED_BANNER))
}

/// Full rule list of a unit: manual selection, provider rules, then change
/// detection.
pub fn unit_rules(unit: &CIUnit) -> Vec<Value> {
    let trigger = &unit.config.trigger;

    let mut patterns = sort_patterns(trigger.patterns());
    if trigger.watch_config() {
        let config_path = unit.config_relative_path();
        if !patterns.contains(&config_path) {
            patterns.push(config_path);
        }
    }

    let mut rules = Vec::new();
    if trigger.allow_manual() {
        rules.extend(manual_rules(&unit.id));
    }

    let ProviderConfig::GitLab(gitlab) = &unit.config.provider;
    rules.extend(gitlab.pipeline.rules().iter().cloned());

    rules.extend(change_rules(&patterns, MAX_CHANGES_PATHS_PER_RULE));
    rules
}

/// Orders patterns from broadest to narrowest: more `**` first, then more
/// `*`, then case-insensitively by name.
pub fn sort_patterns(patterns: &[String]) -> Vec<String> {
    let mut sorted = patterns.to_vec();
    sorted.sort_by_cached_key(|pattern| {
        (
            Reverse(pattern.matches("**").count()),
            Reverse(pattern.matches('*').count()),
            pattern.to_lowercase(),
        )
    });
    sorted
}

/// Manual selection is exclusive: when `$UNITS` names specific units, every
/// other unit is forced off regardless of changes.
pub fn manual_rules(unit_id: &str) -> Vec<Value> {
    let selected = format!(
        r#"{var} == "all" || {var} =~ /\b{id}\b/"#,
        var = UNITS_VARIABLE,
        id = regex::escape(unit_id)
    );

    let mut never = Mapping::new();
    never.insert("if".into(), Value::from(UNITS_VARIABLE));
    never.insert("when".into(), Value::from("never"));

    vec![single_entry("if", Value::from(selected)), Value::Mapping(never)]
}

/// Change detection rules, two per batch of at most `batch_size` paths.
///
/// GitLab cannot pick a `compare_to` base inside a single rule, so each
/// batch gets one rule comparing with the previous commit on long-lived
/// branches and one comparing with `$UNITS_BASE_REF` everywhere else.
pub fn change_rules(patterns: &[String], batch_size: usize) -> Vec<Value> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut rules = Vec::new();
    for batch in patterns.chunks(batch_size.max(1)) {
        let paths = string_list(batch);
        rules.push(change_rule(LONG_LIVED_BRANCH, &paths, PREVIOUS_COMMIT_VARIABLE));
        rules.push(change_rule(OTHER_BRANCH, &paths, BASE_REF_VARIABLE));
    }
    rules
}

fn change_rule(condition: &str, paths: &Value, compare_to: &str) -> Value {
    let mut changes = Mapping::new();
    changes.insert("paths".into(), paths.clone());
    changes.insert("compare_to".into(), Value::from(compare_to));

    let mut rule = Mapping::new();
    rule.insert("if".into(), Value::from(condition));
    rule.insert("changes".into(), Value::Mapping(changes));
    Value::Mapping(rule)
}

fn unit_variables(unit: &CIUnit, command: Option<&str>) -> Value {
    let mut variables = Mapping::new();
    variables.insert("UNIT_ID".into(), Value::from(unit.id.as_str()));
    variables.insert(
        "UNIT_DISPLAY_NAME".into(),
        Value::from(unit.config.name.as_str()),
    );
    if let Some(command) = command {
        variables.insert("UNIT_GENERATOR_COMMAND".into(), Value::from(command));
    }
    Value::Mapping(variables)
}

fn single_entry(key: &str, value: Value) -> Value {
    let mut mapping = Mapping::new();
    mapping.insert(key.into(), value);
    Value::Mapping(mapping)
}

fn string_list<S: AsRef<str>>(items: &[S]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(s.as_ref())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::config::CIUnitConfig;
    use crate::yaml::parse_yaml;
    use std::path::Path;

    fn unit(id: &str, toml: &str) -> CIUnit {
        CIUnit {
            id: id.to_string(),
            config: CIUnitConfig::from_toml_str(toml, Path::new("config.toml")).unwrap(),
        }
    }

    fn static_unit() -> CIUnit {
        unit(
            "lint.rust",
            r#"
name = "Rust lints"
description = "clippy and rustfmt"
[trigger]
patterns = ["Cargo.toml", "src/**/*.rs", "**/*.rs"]
[provider]
type = "gitlab"
[provider.pipeline]
path = ".gitlab/lint.yml"
rules = [{ if = '$CI_PIPELINE_SOURCE == "schedule"', when = "never" }]
"#,
        )
    }

    fn strings(value: &Value) -> Vec<&str> {
        value
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_sort_patterns() {
        let patterns: Vec<String> = ["b/file", "A/*.rs", "**/*.md", "a/**/x/**", "a/*/*"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sort_patterns(&patterns),
            vec!["a/**/x/**", "**/*.md", "a/*/*", "A/*.rs", "b/file"]
        );
    }

    #[test]
    fn test_static_registration() {
        let text = unit_registration(&static_unit()).unwrap();
        assert!(text.starts_with(
            "# This file is generated by `ci-units check --fix`. Do not edit it by hand;\n# update ci/units/<id>/config.toml and re-run the command instead.\n---\n"
        ));

        let parsed = parse_yaml(&text, Path::new("lint.rust.yml")).unwrap();
        assert_eq!(parsed.len(), 1);
        let job = parsed.get("unit:lint:rust").unwrap();

        assert_eq!(
            strings(&job["extends"]),
            vec![".job:unit:base", ".job:unit:static:trigger"]
        );
        assert_eq!(job["variables"]["UNIT_ID"], Value::from("lint.rust"));
        assert_eq!(job["variables"]["UNIT_DISPLAY_NAME"], Value::from("Rust lints"));
        assert_eq!(
            job["trigger"]["include"][0]["local"],
            Value::from(".gitlab/lint.yml")
        );

        let rules = job["rules"].as_sequence().unwrap();
        // manual pair, provider rule, one batch of change rules
        assert_eq!(rules.len(), 5);
        assert_eq!(
            rules[0]["if"],
            Value::from(r#"$UNITS == "all" || $UNITS =~ /\blint\.rust\b/"#)
        );
        assert_eq!(rules[1]["if"], Value::from("$UNITS"));
        assert_eq!(rules[1]["when"], Value::from("never"));
        assert_eq!(
            rules[2]["if"],
            Value::from(r#"$CI_PIPELINE_SOURCE == "schedule""#)
        );
        assert_eq!(
            strings(&rules[3]["changes"]["paths"]),
            vec![
                "**/*.rs",
                "src/**/*.rs",
                "Cargo.toml",
                "ci/units/lint.rust/config.toml"
            ]
        );
        assert_eq!(
            rules[3]["changes"]["compare_to"],
            Value::from("$CI_COMMIT_BEFORE_SHA")
        );
        assert_eq!(rules[4]["changes"]["compare_to"], Value::from("$UNITS_BASE_REF"));
        assert_eq!(rules[3]["changes"]["paths"], rules[4]["changes"]["paths"]);
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let text = unit_registration(&static_unit()).unwrap();
        let extends = text.find("extends:").unwrap();
        let variables = text.find("variables:").unwrap();
        let trigger = text.find("trigger:").unwrap();
        let rules = text.find("rules:").unwrap();
        assert!(extends < variables && variables < trigger && trigger < rules);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let unit = static_unit();
        assert_eq!(
            unit_registration(&unit).unwrap(),
            unit_registration(&unit).unwrap()
        );
    }

    #[test]
    fn test_dynamic_registration() {
        let unit = unit(
            "docs",
            r#"
name = "Docs"
description = "Documentation"
[trigger]
patterns = ["docs/**"]
allow-manual = false
[provider]
type = "gitlab"
pipeline = { command = "tools/gen-docs" }
"#,
        );
        let text = unit_registration(&unit).unwrap();
        let parsed = parse_yaml(&text, Path::new("docs.yml")).unwrap();

        let names: Vec<&str> = parsed.keys().map(|k| k.as_str().unwrap()).collect();
        assert_eq!(names, vec!["unit:docs:generate", "unit:docs"]);

        let generate = &parsed["unit:docs:generate"];
        assert_eq!(
            strings(&generate["extends"]),
            vec![".job:unit:base", ".job:unit:dynamic:generate"]
        );
        assert_eq!(
            generate["variables"]["UNIT_GENERATOR_COMMAND"],
            Value::from("tools/gen-docs")
        );
        // No manual rules, so only the change detection pair.
        assert_eq!(generate["rules"].as_sequence().unwrap().len(), 2);

        let trigger = &parsed["unit:docs"];
        assert_eq!(
            strings(&trigger["extends"]),
            vec![".job:unit:base", ".job:unit:dynamic:trigger"]
        );
        assert!(trigger.get("rules").is_none());
        assert_eq!(trigger["needs"][0]["job"], Value::from("unit:docs:generate"));
        assert_eq!(trigger["needs"][0]["artifacts"], Value::Bool(true));
        assert_eq!(
            trigger["trigger"]["include"][0]["artifact"],
            Value::from("pipeline.yml")
        );
        assert_eq!(
            trigger["trigger"]["include"][0]["job"],
            Value::from("unit:docs:generate")
        );
    }

    #[test]
    fn test_change_rules_are_batched() {
        let patterns: Vec<String> = (0..120).map(|i| format!("dir{}/**", i)).collect();
        let rules = change_rules(&patterns, MAX_CHANGES_PATHS_PER_RULE);
        assert_eq!(rules.len(), 6);

        let sizes: Vec<usize> = rules
            .iter()
            .map(|r| r["changes"]["paths"].as_sequence().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![50, 50, 50, 50, 20, 20]);
    }

    #[test]
    fn test_watch_config_not_duplicated() {
        let unit = unit(
            "a",
            r#"
name = "A"
description = "a"
[trigger]
patterns = ["ci/units/a/config.toml"]
[provider]
type = "gitlab"
pipeline = { path = "a.yml" }
"#,
        );
        let rules = unit_rules(&unit);
        let change = rules.iter().find(|r| r.get("changes").is_some()).unwrap();
        assert_eq!(
            strings(&change["changes"]["paths"]),
            vec!["ci/units/a/config.toml"]
        );
    }

    #[test]
    fn test_no_patterns_without_watch_config() {
        let unit = unit(
            "a",
            "name = \"A\"\ndescription = \"a\"\n[trigger]\nwatch-config = false\n[provider]\ntype = \"gitlab\"\npipeline = { path = \"a.yml\" }\n",
        );
        let rules = unit_rules(&unit);
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.get("changes").is_none()));
    }
}
