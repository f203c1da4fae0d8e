//! Pluggable domain adapters and the registry that looks them up by name.

use crate::class::Class;
use crate::error::ConfigError;
use crate::query::Query;
use crate::store::{Store, StoreConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tera::Function;

/// A named plug-in for a family of observability signals (k8s, log,
/// metric, ...). Implementers model this as a record of function pointers
/// rather than a tagged enum: new domains are added at build time, not
/// decoded from data, so there's no need for `dyn`-safe downcasting beyond
/// what's already on [`crate::object::Object`].
pub trait Domain: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Ordered sequence of classes. Order is significant: it is part of the
    /// engine's reproducibility guarantee.
    fn classes(&self) -> Vec<Class>;

    fn class(&self, name: &str) -> Option<Class> {
        self.classes().into_iter().find(|c| c.name() == name)
    }

    /// Parses the domain-specific body after the `<domain>:<class>:` prefix
    /// has already been split off by the caller.
    fn parse_query(&self, class: &str, body: &str) -> Result<Query, ConfigError>;

    /// Constructs a [`Store`] from an already-expanded [`StoreConfig`].
    fn build_store(&self, config: &StoreConfig) -> Result<Arc<dyn Store>, ConfigError>;

    /// Optional per-domain template functions, merged into the engine's
    /// function table. Default: none.
    fn template_funcs(&self) -> HashMap<String, Box<dyn Function>> {
        HashMap::new()
    }

    /// Renders a query as a deep link into this domain's own UI (e.g. a
    /// Grafana Explore URL for a `log` query). Domains that don't have a
    /// console, or whose console isn't URL-addressable, leave this unset.
    fn query_to_console_url(&self, _query: &Query) -> Option<url::Url> {
        None
    }

    /// The inverse of [`Domain::query_to_console_url`]: recovers the `Query`
    /// a console URL was generated from. Implementers that provide both
    /// directions must round-trip: `console_url_to_query(query_to_console_url(q)) == q`.
    fn console_url_to_query(&self, _url: &url::Url) -> Option<Query> {
        None
    }
}

/// Registers domains by name, rejecting duplicates, and preserves insertion
/// order on iteration, required for reproducible graphs across engine
/// instances built from identical config.
#[derive(Default)]
pub struct DomainRegistry {
    order: Vec<String>,
    domains: HashMap<String, Arc<dyn Domain>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_domain(&mut self, domain: Arc<dyn Domain>) -> Result<(), ConfigError> {
        let name = domain.name().to_string();
        if self.domains.contains_key(&name) {
            return Err(ConfigError::DuplicateDomain(name));
        }
        self.order.push(name.clone());
        self.domains.insert(name, domain);
        Ok(())
    }

    pub fn domain(&self, name: &str) -> Option<&Arc<dyn Domain>> {
        self.domains.get(name)
    }

    /// Iterates domains in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Domain>> {
        self.order.iter().map(move |name| &self.domains[name])
    }

    pub fn class(&self, domain: &str, class: &str) -> Option<Class> {
        self.domain(domain)?.class(class)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str);

    impl Domain for Stub {
        fn name(&self) -> &str {
            self.0
        }

        fn classes(&self) -> Vec<Class> {
            vec![Class::new(self.0, "a", "")]
        }

        fn parse_query(&self, class: &str, body: &str) -> Result<Query, ConfigError> {
            Ok(Query::new(self.0, class, body))
        }

        fn build_store(&self, _config: &StoreConfig) -> Result<Arc<dyn Store>, ConfigError> {
            unimplemented!("not exercised in this test")
        }
    }

    #[test]
    fn add_domain_rejects_duplicates() {
        let mut registry = DomainRegistry::new();
        registry.add_domain(Arc::new(Stub("x"))).unwrap();
        let err = registry.add_domain(Arc::new(Stub("x"))).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDomain(_)));
    }

    #[test]
    fn iteration_order_matches_insertion_order() {
        let mut registry = DomainRegistry::new();
        registry.add_domain(Arc::new(Stub("b"))).unwrap();
        registry.add_domain(Arc::new(Stub("a"))).unwrap();
        let names: Vec<_> = registry.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    /// A domain whose console is a single query-string parameter, to exercise
    /// the `query_to_console_url`/`console_url_to_query` round-trip law.
    struct ConsoleDomain;

    impl Domain for ConsoleDomain {
        fn name(&self) -> &str {
            "log"
        }

        fn classes(&self) -> Vec<Class> {
            vec![Class::new("log", "application", "")]
        }

        fn parse_query(&self, class: &str, body: &str) -> Result<Query, ConfigError> {
            Ok(Query::new("log", class, body))
        }

        fn build_store(&self, _config: &StoreConfig) -> Result<Arc<dyn Store>, ConfigError> {
            unimplemented!("not exercised in this test")
        }

        fn query_to_console_url(&self, query: &Query) -> Option<url::Url> {
            let mut url = url::Url::parse("https://console.example/explore").ok()?;
            url.query_pairs_mut()
                .append_pair("class", query.class())
                .append_pair("q", query.body());
            Some(url)
        }

        fn console_url_to_query(&self, url: &url::Url) -> Option<Query> {
            let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
            Some(Query::new("log", pairs.get("class")?.as_str(), pairs.get("q")?.as_str()))
        }
    }

    #[test]
    fn console_url_round_trips_through_query() {
        let domain = ConsoleDomain;
        let query = Query::new("log", "application", "{pod=\"x\"}");
        let url = domain.query_to_console_url(&query).expect("url");
        let parsed = domain.console_url_to_query(&url).expect("query");
        assert_eq!(parsed, query);
    }

    #[test]
    fn console_url_defaults_to_none() {
        let stub = Stub("x");
        let query = Query::new("x", "a", "body");
        assert!(stub.query_to_console_url(&query).is_none());
    }
}
