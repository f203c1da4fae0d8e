//! The store contract and store-config template expansion.

use crate::aggregate::Appender;
use crate::error::{ConfigError, EngineError};
use crate::query::{Constraint, Query};
use crate::template::TemplateEngine;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// A connected endpoint to a single [`crate::domain::Domain`].
///
/// `Get` streams matching objects into `appender`; implementations must
/// check `cancel` at I/O suspension points and return [`EngineError::Cancelled`]
/// promptly once it is triggered (target: within 100ms). The engine also
/// races every call against `cancel` itself, so a store that never polls it
/// is still aborted promptly from the caller's side.
#[async_trait]
pub trait Store: Send + Sync {
    /// The name of the domain this store serves, e.g. `"log"`.
    fn domain_name(&self) -> &str;

    async fn get(
        &self,
        query: &Query,
        constraint: Option<&Constraint>,
        appender: &Appender,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;

    /// Optional per-store template functions, merged into the engine's
    /// function table at build time (last-writer-wins, with a warning on
    /// collision; see [`crate::template::TemplateEngine::register_domain_funcs`]).
    fn template_funcs(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A string→string mapping with two reserved keys, `domain` and `error`.
/// Every other key is domain-specific and templated before being handed to
/// the domain's store constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    values: BTreeMap<String, String>,
}

pub const DOMAIN_KEY: &str = "domain";
pub const ERROR_KEY: &str = "error";

impl StoreConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(DOMAIN_KEY.to_string(), domain.into());
        StoreConfig { values }
    }

    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        StoreConfig { values }
    }

    pub fn domain(&self) -> Option<&str> {
        self.values.get(DOMAIN_KEY).map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.values.get(ERROR_KEY).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Records a construction/expansion failure in-band,
    /// contract: `StoreConfig["error"]` is populated and returned verbatim in
    /// domain inspection output.
    pub fn set_error(&mut self, err: impl ToString) {
        self.set(ERROR_KEY, err.to_string());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders every value in `config` as a Tera template against an empty
/// context, using `templates`' function table. This is a fixed point: after
/// expansion no `{{…}}` should remain in any value.
///
/// On a template error for any single key, expansion stops and the error is
/// returned; callers should set [`StoreConfig::set_error`] on the config and
/// skip store construction for it,
/// the same domain usable.
pub fn expand_store_config(
    config: &StoreConfig,
    templates: &TemplateEngine,
) -> Result<StoreConfig, ConfigError> {
    let mut expanded = BTreeMap::new();
    for (key, value) in config.iter() {
        if key == DOMAIN_KEY || key == ERROR_KEY {
            expanded.insert(key.to_string(), value.to_string());
            continue;
        }
        let rendered = templates
            .render_str(value)
            .map_err(|e| ConfigError::Template(format!("{key}: {e}")))?;
        if contains_unexpanded_delimiters(&rendered) {
            return Err(ConfigError::Template(format!(
                "{key}: expansion did not reach a fixed point: {rendered}"
            )));
        }
        expanded.insert(key.to_string(), rendered);
    }
    Ok(StoreConfig::from_map(expanded))
}

fn contains_unexpanded_delimiters(s: &str) -> bool {
    s.contains("{{") || s.contains("}}")
}
