//! Engine construction (build phase) and the frozen, read-only engine used
//! by traversals.

use crate::aggregate::Appender;
use crate::class::Class;
use crate::domain::{Domain, DomainRegistry};
use crate::error::{ConfigError, EngineError};
use crate::graph::ClassGraph;
use crate::query::{Constraint, Query};
use crate::rule::{compile_rule_def, Rule, RuleDef};
use crate::store::{expand_store_config, Store, StoreConfig};
use crate::template::TemplateEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tokio_util::sync::CancellationToken;

/// A store plus the (possibly error-bearing) config it was built from, kept
/// around for `/domains`-style inspection
pub struct StoreEntry {
    pub config: StoreConfig,
    pub store: Option<Arc<dyn Store>>,
}

/// Accumulates domains, store configs and rules during the build phase.
/// Nothing here is read-only yet; call [`EngineBuilder::freeze`] to get an
/// [`Engine`].
pub struct EngineBuilder {
    domains: DomainRegistry,
    templates: TemplateEngine,
    store_entries: HashMap<String, Vec<StoreEntry>>,
    rules: Vec<Rule>,
}

impl EngineBuilder {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(EngineBuilder {
            domains: DomainRegistry::new(),
            templates: TemplateEngine::new().map_err(|e| ConfigError::Template(e.to_string()))?,
            store_entries: HashMap::new(),
            rules: Vec::new(),
        })
    }

    pub fn add_domain(&mut self, domain: Arc<dyn Domain>) -> Result<&mut Self, ConfigError> {
        let funcs = domain.template_funcs();
        if !funcs.is_empty() {
            self.templates.register_domain_funcs(funcs);
        }
        self.domains.add_domain(domain)?;
        Ok(self)
    }

    /// Expands `config`'s values as templates, then asks the named domain to
    /// build a [`Store`] from the expanded config. A failure here never
    /// propagates as a hard error: it is recorded via
    /// [`StoreConfig::set_error`] and the store is simply absent from that
    /// domain's store list; other stores for the same domain are unaffected.
    pub fn add_store_config(&mut self, config: StoreConfig) -> &mut Self {
        let domain_name = match config.domain() {
            Some(d) => d.to_string(),
            None => {
                let mut config = config;
                config.set_error("store config missing required `domain` key");
                self.store_entries.entry(String::new()).or_default().push(StoreEntry {
                    config,
                    store: None,
                });
                return self;
            }
        };

        let entry = match self.build_store_entry(&domain_name, config) {
            Ok(entry) => entry,
            Err((mut config, err)) => {
                config.set_error(err);
                StoreEntry { config, store: None }
            }
        };
        self.store_entries.entry(domain_name).or_default().push(entry);
        self
    }

    fn build_store_entry(
        &self,
        domain_name: &str,
        config: StoreConfig,
    ) -> Result<StoreEntry, (StoreConfig, ConfigError)> {
        let expanded = match expand_store_config(&config, &self.templates) {
            Ok(e) => e,
            Err(err) => return Err((config, err)),
        };
        let domain = match self.domains.domain(domain_name) {
            Some(d) => d,
            None => return Err((expanded, ConfigError::DomainNotFound(domain_name.to_string()))),
        };
        match domain.build_store(&expanded) {
            Ok(store) => Ok(StoreEntry {
                config: expanded,
                store: Some(store),
            }),
            Err(err) => Err((expanded, err)),
        }
    }

    /// Compiles a [`RuleDef`] into its cartesian expansion and adds the
    /// resulting rules, erroring if any named class isn't registered.
    pub fn add_rule_def(&mut self, def: &RuleDef) -> Result<&mut Self, ConfigError> {
        let rules = compile_rule_def(def, |domain, class| self.domains.class(domain, class))?;
        self.rules.extend(rules);
        Ok(self)
    }

    /// Freezes the builder: domains, stores and rules become read-only.
    /// After this point, reads are lock-free (the only mutable state left is
    /// per-traversal result graphs, which are private to each traversal).
    pub fn freeze(self) -> Arc<Engine> {
        let class_graph = ClassGraph::from_rules(&self.rules);
        let engine = Arc::new(Engine {
            domains: self.domains,
            templates: Arc::new(self.templates),
            store_entries: self.store_entries,
            rules: self.rules,
            class_graph,
        });
        engine.install_get_handler();
        engine
    }
}

/// The frozen engine: domains, stores, rules and the derived class graph.
/// Traversals borrow this read-only.
pub struct Engine {
    domains: DomainRegistry,
    templates: Arc<TemplateEngine>,
    store_entries: HashMap<String, Vec<StoreEntry>>,
    rules: Vec<Rule>,
    class_graph: ClassGraph,
}

impl Engine {
    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn class_graph(&self) -> &ClassGraph {
        &self.class_graph
    }

    pub fn class(&self, domain: &str, class: &str) -> Result<Class, EngineError> {
        self.domains
            .class(domain, class)
            .ok_or_else(|| EngineError::ClassNotFound(domain.to_string(), class.to_string()))
    }

    /// Store entries for a domain, in registration order, including failed
    /// ones (`store: None`, `config.error()` populated) for `/domains`
    /// inspection.
    pub fn store_entries(&self, domain: &str) -> &[StoreEntry] {
        self.store_entries.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    fn stores_for(&self, domain: &str) -> impl Iterator<Item = &Arc<dyn Store>> {
        self.store_entries(domain).iter().filter_map(|e| e.store.as_ref())
    }

    /// Fans a query out to every store registered for `query`'s domain, in
    /// registration order, merging their results. Short-circuits on the
    /// first store error unless `best_effort` is set, in which case a failed
    /// store is skipped (its error discarded by the caller, which is
    /// expected to log it) and the remaining stores still run.
    pub async fn execute_query(
        &self,
        query: &Query,
        constraint: Option<&Constraint>,
        cancel: &CancellationToken,
        best_effort: bool,
    ) -> Result<Vec<crate::object::ObjectRef>, EngineError> {
        if self.domains.domain(query.domain()).is_none() {
            return Err(EngineError::DomainNotFound(query.domain().to_string()));
        }
        let scratch = Appender::new(None);
        let mut stores = self.stores_for(query.domain()).peekable();
        if stores.peek().is_none() {
            return Err(EngineError::StoreNotFound(query.domain().to_string()));
        }

        let timer = crate::metrics::EDGE_QUERY_DURATION
            .with_label_values(&[query.domain()])
            .start_timer();

        for store in stores {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            // Race the store call against cancellation so a store that
            // doesn't poll `cancel` itself still gets aborted promptly,
            // rather than trusting every implementation to do so.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(EngineError::Cancelled),
                result = store.get(query, constraint, &scratch, cancel) => result,
            };
            if let Err(err) = result {
                crate::metrics::STORE_ERRORS_TOTAL
                    .with_label_values(&[query.domain(), err.metric_kind()])
                    .inc();
                if best_effort && err.is_recoverable() {
                    tracing::warn!(domain = query.domain(), error = %err, "store unavailable, continuing in best-effort mode");
                    continue;
                }
                timer.stop_and_discard();
                return Err(err);
            }
        }
        timer.observe_duration();
        Ok(scratch.list())
    }

    fn install_get_handler(self: &Arc<Self>) {
        let weak: Weak<Engine> = Arc::downgrade(self);
        let cell: Arc<RwLock<Option<Weak<Engine>>>> = Arc::new(RwLock::new(Some(weak)));
        let handler_cell = cell;
        let templates = Arc::clone(&self.templates);
        templates.install_get_handler(Arc::new(move |query_string: &str| {
            let engine = handler_cell
                .read()
                .expect("lock poisoned")
                .clone()
                .and_then(|w| w.upgrade())
                .ok_or_else(|| "engine dropped".to_string())?;
            let query = Query::from_wire_string(query_string)
                .ok_or_else(|| format!("malformed query string: {query_string}"))?;
            // `get` runs inside a synchronous Tera function, but executing a
            // query is async I/O; bridge the two the way a CPU-bound worker
            // bridges back into an async runtime, via `block_in_place` +
            // `Handle::current().block_on`. Requires a multi-thread runtime.
            let cancel = CancellationToken::new();
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current()
                    .block_on(engine.execute_query(&query, None, &cancel, true))
            })
            .map(|objects| objects.iter().map(|o| o.template_context()).collect())
            .map_err(|e| e.to_string())
        }));
    }
}
