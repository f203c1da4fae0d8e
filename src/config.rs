//! YAML configuration schema: stores, rules, aliases, includes.
//!
//! Parsing and `merge_includes` are pure: both take already-read file
//! contents and never touch a filesystem. Walking `include` paths, watching
//! for hot-reload, and deciding which files to read is left to the embedding
//! CLI or service layer.

use crate::error::ConfigError;
use crate::rule::RuleDef;
use crate::store::StoreConfig;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One YAML configuration document, before alias expansion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub stores: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    /// Maps an alias name to the class names it expands to, e.g.
    /// `workloads: [Pod, Deployment, StatefulSet]`.
    #[serde(default)]
    pub aliases: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub include: Vec<String>,
}

impl ConfigFile {
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(s).map_err(|e| ConfigError::Template(format!("invalid config yaml: {e}")))
    }
}

/// A fully merged configuration: every `include`d file folded in, in the
/// order each was first included, with `aliases` already expanded in
/// `rules`. This is what [`crate::engine::EngineBuilder`] consumes.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub stores: Vec<StoreConfig>,
    pub rules: Vec<RuleDef>,
}

/// Merges `root` plus every file it (transitively) `include`s, given the
/// already-read contents of every file reachable from it.
///
/// `files` maps an include path to its YAML text; `root` must be a key in
/// `files`. Cycles in the include graph (by path) are rejected. Aliases
/// from every merged file are expanded into `rules` before classes are
/// resolved; an alias referenced but never defined is left as a literal
/// class name, since alias resolution happens purely against names and the
/// caller's domain registry gets the final say on whether that name exists.
pub fn merge_includes(root: &str, files: &HashMap<String, String>) -> Result<Config, ConfigError> {
    let mut visited = HashSet::new();
    let mut in_progress = HashSet::new();
    let mut stores = Vec::new();
    let mut rules = Vec::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();

    merge_one(root, files, &mut visited, &mut in_progress, &mut stores, &mut rules, &mut aliases)?;

    for rule in &mut rules {
        expand_aliases(&mut rule.start.classes, &aliases);
        expand_aliases(&mut rule.goal.classes, &aliases);
    }

    let stores = stores.into_iter().map(StoreConfig::from_map).collect();
    Ok(Config { stores, rules })
}

#[allow(clippy::too_many_arguments)]
fn merge_one(
    path: &str,
    files: &HashMap<String, String>,
    visited: &mut HashSet<String>,
    in_progress: &mut HashSet<String>,
    stores: &mut Vec<BTreeMap<String, String>>,
    rules: &mut Vec<RuleDef>,
    aliases: &mut HashMap<String, Vec<String>>,
) -> Result<(), ConfigError> {
    if visited.contains(path) {
        return Ok(());
    }
    if !in_progress.insert(path.to_string()) {
        return Err(ConfigError::IncludeCycle(path.to_string()));
    }

    let contents = files
        .get(path)
        .ok_or_else(|| ConfigError::InvalidQuery(format!("include path not provided: {path}")))?;
    let file = ConfigFile::from_yaml(contents)?;

    for include in &file.include {
        merge_one(include, files, visited, in_progress, stores, rules, aliases)?;
    }

    stores.extend(file.stores);
    rules.extend(file.rules);
    for (name, classes) in file.aliases {
        aliases.insert(name, classes);
    }

    in_progress.remove(path);
    visited.insert(path.to_string());
    Ok(())
}

/// Replaces any class name in `classes` that names an alias with the
/// alias's expansion, in place, preserving relative order. Expansion is one
/// level deep: aliases do not reference other aliases, matching how classes
/// are named literals in the rest of the schema.
fn expand_aliases(classes: &mut Vec<String>, aliases: &HashMap<String, Vec<String>>) {
    let mut expanded = Vec::with_capacity(classes.len());
    for name in classes.drain(..) {
        match aliases.get(&name) {
            Some(members) => expanded.extend(members.iter().cloned()),
            None => expanded.push(name),
        }
    }
    *classes = expanded;
}
