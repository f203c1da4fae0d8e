//! Declarative rules: start/goal classes plus a templated query body.

use crate::class::Class;
use crate::error::ConfigError;
use crate::object::ObjectRef;
use crate::query::Query;
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};

/// Wire form of a rule, as it appears in the YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    pub start: RuleSide,
    pub goal: RuleSide,
    pub result: RuleResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSide {
    pub domain: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub query: String,
}

/// A compiled rule: one concrete (start class, goal class) pair with its
/// template body. A `RuleDef` whose template is not class-specific expands
/// to the cartesian product of `start.classes × goal.classes`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub start: Class,
    pub goal: Class,
    pub template: String,
}

impl Rule {
    /// Instantiates a [`Query`] by rendering `self.template` against
    /// `start_object`'s native representation, using `templates`' function
    /// table (including the built-in `get`).
    ///
    /// An empty rendered body is a valid no-op, treated as zero matches, not
    /// an error. A template error is returned so the caller can abort only
    /// this (rule, start-object) pair.
    pub fn instantiate(
        &self,
        start_object: &ObjectRef,
        templates: &TemplateEngine,
    ) -> Result<Query, ConfigError> {
        let context = tera::Context::from_value(start_object.template_context())
            .map_err(|e| ConfigError::Template(e.to_string()))?;
        let body = templates
            .render_str_with_context(&self.template, &context)
            .map_err(|e| ConfigError::Template(format!("rule {}: {e}", self.name)))?;
        Ok(Query::for_class(&self.goal, body.trim().to_string()))
    }
}

/// Expands a [`RuleDef`] into one or more compiled [`Rule`]s, resolving
/// class names against the already-registered classes for the start/goal
/// domains. Fails if either domain or any named class is not registered.
pub fn compile_rule_def(
    def: &RuleDef,
    resolve_class: impl Fn(&str, &str) -> Option<Class>,
) -> Result<Vec<Rule>, ConfigError> {
    if def.start.classes.is_empty() || def.goal.classes.is_empty() {
        return Err(ConfigError::InvalidRule {
            name: def.name.clone(),
            reason: "start and goal must each name at least one class".to_string(),
        });
    }

    let mut rules = Vec::with_capacity(def.start.classes.len() * def.goal.classes.len());
    for start_name in &def.start.classes {
        let start = resolve_class(&def.start.domain, start_name).ok_or_else(|| {
            ConfigError::ClassNotFound(def.start.domain.clone(), start_name.clone())
        })?;
        for goal_name in &def.goal.classes {
            let goal = resolve_class(&def.goal.domain, goal_name).ok_or_else(|| {
                ConfigError::ClassNotFound(def.goal.domain.clone(), goal_name.clone())
            })?;
            rules.push(Rule {
                name: def.name.clone(),
                start: start.clone(),
                goal: goal.clone(),
                template: def.result.query.clone(),
            });
        }
    }
    Ok(rules)
}
