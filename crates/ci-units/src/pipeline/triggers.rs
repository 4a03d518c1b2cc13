//! Discovery of downstream pipelines launched through `trigger.include`.
//!
//! The traversal is best effort: a triggered file that is missing or fails
//! to load is logged and left out, and the rest of the tree is still
//! collected.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::CiUnitsError;

/// Identifier of the root pipeline in [`TriggeredConfigurations`].
pub const MAIN_PIPELINE_ID: &str = "main";

const TRIGGER_KEY: &str = "trigger";
const INCLUDE_KEY: &str = "include";
const LOCAL_KEY: &str = "local";

/// File names referenced by a `trigger.include` value.
pub fn get_trigger_filenames(node: &Value) -> Vec<String> {
    match node {
        Value::String(path) => vec![path.clone()],
        Value::Mapping(mapping) => match mapping.get(LOCAL_KEY).and_then(Value::as_str) {
            Some(path) => vec![path.to_string()],
            None => Vec::new(),
        },
        Value::Sequence(items) => items.iter().flat_map(get_trigger_filenames).collect(),
        _ => Vec::new(),
    }
}

/// Pipeline files triggered by the jobs of a resolved configuration.
///
/// Top-level entries that are not mappings (`stages`, `variables` lists and
/// the like) are not jobs and are ignored.
pub fn find_triggered_pipelines(config: &Mapping) -> Vec<String> {
    config
        .values()
        .filter_map(Value::as_mapping)
        .filter_map(|job| job.get(TRIGGER_KEY).and_then(Value::as_mapping))
        .filter_map(|trigger| trigger.get(INCLUDE_KEY))
        .flat_map(get_trigger_filenames)
        .collect()
}

/// A triggered pipeline that could not be included in the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPipeline {
    pub path: String,
    pub reason: String,
}

/// Every pipeline reachable from the root through trigger jobs.
#[derive(Debug, Clone, Default)]
pub struct TriggeredConfigurations {
    /// Resolved configurations keyed by pipeline file path, plus
    /// [`MAIN_PIPELINE_ID`] for the root.
    pub configs: BTreeMap<String, Mapping>,
    /// Files that were missing or failed to load.
    pub skipped: Vec<SkippedPipeline>,
    /// Trigger chains that lead back to a pipeline already on the chain.
    pub cycles: Vec<Vec<String>>,
}

impl TriggeredConfigurations {
    pub fn get(&self, id: &str) -> Option<&Mapping> {
        self.configs.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}

/// Breadth-first collection of `main_config` and every pipeline it triggers.
///
/// `file_reader` loads and fully resolves one pipeline file given its
/// absolute path. Each file is processed at most once. Reaching a file
/// already on the current trigger chain is recorded as a cycle; reaching it
/// from another branch is ordinary convergence.
pub fn get_all_triggered_configurations<F>(
    main_config: Mapping,
    mut file_reader: F,
    project_root: &Path,
) -> TriggeredConfigurations
where
    F: FnMut(&Path) -> Result<Mapping, CiUnitsError>,
{
    let _span = tracing::info_span!("pipeline.triggers").entered();

    let mut result = TriggeredConfigurations::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(Mapping, Vec<String>)> = VecDeque::new();

    result
        .configs
        .insert(MAIN_PIPELINE_ID.to_string(), main_config.clone());
    queue.push_back((main_config, vec![MAIN_PIPELINE_ID.to_string()]));

    while let Some((config, chain)) = queue.pop_front() {
        for path in find_triggered_pipelines(&config) {
            if chain.contains(&path) {
                let mut cycle = chain.clone();
                cycle.push(path.clone());
                log::error!("Trigger cycle detected: {}", cycle.join(" -> "));
                result.cycles.push(cycle);
                continue;
            }

            if !seen.insert(path.clone()) {
                log::debug!(
                    "Pipeline '{}' already processed, reached again from '{}'",
                    path,
                    chain.last().map(String::as_str).unwrap_or(MAIN_PIPELINE_ID)
                );
                continue;
            }

            let full_path = project_root.join(path.trim_start_matches('/'));
            if !full_path.is_file() {
                log::warn!("Triggered pipeline '{}' does not exist, skipping", path);
                result.skipped.push(SkippedPipeline {
                    path,
                    reason: "file does not exist".to_string(),
                });
                continue;
            }

            match file_reader(&full_path) {
                Ok(resolved) => {
                    log::debug!("Resolved triggered pipeline '{}'", path);
                    let mut next_chain = chain.clone();
                    next_chain.push(path.clone());
                    result.configs.insert(path, resolved.clone());
                    queue.push_back((resolved, next_chain));
                }
                Err(e) => {
                    log::warn!("Failed to load triggered pipeline '{}': {}", path, e);
                    result.skipped.push(SkippedPipeline {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    result
}
