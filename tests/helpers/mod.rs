#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use correlate_engine::aggregate::Appender;
use correlate_engine::{
    Class, ConfigError, Constraint, Domain, Engine, EngineBuilder, EngineError, Object, ObjectId,
    Query, RuleDef, Store, StoreConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct MockRecord {
    id: String,
    ts: Option<DateTime<Utc>>,
}

impl Object for MockRecord {
    fn identifier(&self) -> ObjectId {
        ObjectId::from(self.id.clone())
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.ts
    }

    fn template_context(&self) -> serde_json::Value {
        serde_json::json!({ "id": self.id })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Resolves a query body into object ids: a JSON array seeds several
/// objects at once (a traversal's start query), a bare string is the single
/// id an identity rule's `{{ id }}` template renders to.
fn parse_ids(body: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(body).unwrap_or_else(|_| vec![body.to_string()])
}

/// An identity store for the `mock` domain's classes (`a`, `b`, `c`): every
/// query body names the id(s) of the object(s) it returns, untimestamped.
pub struct IdentityStore {
    pub domain: &'static str,
}

#[async_trait]
impl Store for IdentityStore {
    fn domain_name(&self) -> &str {
        self.domain
    }

    async fn get(
        &self,
        query: &Query,
        _constraint: Option<&Constraint>,
        appender: &Appender,
        _cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for id in parse_ids(query.body()) {
            appender.append(Arc::new(MockRecord { id, ts: None }));
        }
        Ok(())
    }
}

/// Like [`IdentityStore`] but sleeps before yielding, so cancellation tests
/// can observe a traversal aborting mid-flight.
pub struct SlowStore {
    pub domain: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
    fn domain_name(&self) -> &str {
        self.domain
    }

    async fn get(
        &self,
        query: &Query,
        _constraint: Option<&Constraint>,
        appender: &Appender,
        _cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        tokio::time::sleep(self.delay).await;
        for id in parse_ids(query.body()) {
            appender.append(Arc::new(MockRecord { id, ts: None }));
        }
        Ok(())
    }
}

/// Returns a fixed set of timestamped records regardless of query body, for
/// constraint/time-window tests.
pub struct FixedStore {
    pub domain: &'static str,
    pub records: Vec<(&'static str, DateTime<Utc>)>,
}

#[async_trait]
impl Store for FixedStore {
    fn domain_name(&self) -> &str {
        self.domain
    }

    async fn get(
        &self,
        _query: &Query,
        _constraint: Option<&Constraint>,
        appender: &Appender,
        _cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for (id, ts) in &self.records {
            appender.append(Arc::new(MockRecord {
                id: id.to_string(),
                ts: Some(*ts),
            }));
        }
        Ok(())
    }
}

/// A domain with exactly one class, backed by one pre-built store.
pub struct SingleClassDomain {
    pub name: &'static str,
    pub class: &'static str,
    pub store: Arc<dyn Store>,
}

impl Domain for SingleClassDomain {
    fn name(&self) -> &str {
        self.name
    }

    fn classes(&self) -> Vec<Class> {
        vec![Class::new(self.name, self.class, "")]
    }

    fn parse_query(&self, class: &str, body: &str) -> Result<Query, ConfigError> {
        Ok(Query::new(self.name, class, body))
    }

    fn build_store(&self, _config: &StoreConfig) -> Result<Arc<dyn Store>, ConfigError> {
        Ok(self.store.clone())
    }
}

fn register(builder: &mut EngineBuilder, name: &'static str, class: &'static str, store: Arc<dyn Store>) {
    builder
        .add_domain(Arc::new(SingleClassDomain { name, class, store }))
        .unwrap();
    builder.add_store_config(StoreConfig::new(name));
}

/// A single `mock` domain exposing classes `a`, `b`, `c`, `d`, all backed by
/// the same identity store.
pub struct MultiClassMockDomain {
    store: Arc<dyn Store>,
}

impl Domain for MultiClassMockDomain {
    fn name(&self) -> &str {
        "mock"
    }

    fn classes(&self) -> Vec<Class> {
        vec![
            Class::new("mock", "a", ""),
            Class::new("mock", "b", ""),
            Class::new("mock", "c", ""),
            Class::new("mock", "d", ""),
        ]
    }

    fn parse_query(&self, class: &str, body: &str) -> Result<Query, ConfigError> {
        Ok(Query::new("mock", class, body))
    }

    fn build_store(&self, _config: &StoreConfig) -> Result<Arc<dyn Store>, ConfigError> {
        Ok(self.store.clone())
    }
}

/// Builds the real fixture: one `mock` domain, classes a/b/c, the given
/// identity rules between them.
pub fn build_engine_with_rules(rules: &[RuleDef]) -> Arc<Engine> {
    let mut builder = EngineBuilder::new().unwrap();
    let store = Arc::new(IdentityStore { domain: "mock" });
    builder
        .add_domain(Arc::new(MultiClassMockDomain { store: store.clone() }))
        .unwrap();
    builder.add_store_config(StoreConfig::new("mock"));
    for rule in rules {
        builder.add_rule_def(rule).unwrap();
    }
    builder.freeze()
}

pub fn identity_rule(name: &str, start_class: &str, goal_class: &str) -> RuleDef {
    use correlate_engine::rule::{RuleResult, RuleSide};
    RuleDef {
        name: name.to_string(),
        start: RuleSide {
            domain: "mock".to_string(),
            classes: vec![start_class.to_string()],
        },
        goal: RuleSide {
            domain: "mock".to_string(),
            classes: vec![goal_class.to_string()],
        },
        result: RuleResult {
            query: "{{ id }}".to_string(),
        },
    }
}

/// Builds an engine with `log:application` backed by a [`FixedStore`]
/// returning three timestamped records.
pub fn build_log_engine(records: Vec<(&'static str, DateTime<Utc>)>) -> Arc<Engine> {
    let mut builder = EngineBuilder::new().unwrap();
    register(
        &mut builder,
        "log",
        "application",
        Arc::new(FixedStore { domain: "log", records }),
    );
    builder.freeze()
}

/// Builds an engine for the cancellation scenario: `mock:a` is fast,
/// `mock:b` is slow, joined by one identity rule `AtoB`.
pub fn build_slow_engine(delay: Duration) -> Arc<Engine> {
    let mut builder = EngineBuilder::new().unwrap();
    register(&mut builder, "a", "item", Arc::new(IdentityStore { domain: "a" }));
    register(&mut builder, "b", "item", Arc::new(SlowStore { domain: "b", delay }));
    builder
        .add_rule_def(&identity_rule_cross_domain("AtoB", "a", "item", "b", "item"))
        .unwrap();
    builder.freeze()
}

pub fn identity_rule_cross_domain(
    name: &str,
    start_domain: &str,
    start_class: &str,
    goal_domain: &str,
    goal_class: &str,
) -> RuleDef {
    use correlate_engine::rule::{RuleResult, RuleSide};
    RuleDef {
        name: name.to_string(),
        start: RuleSide {
            domain: start_domain.to_string(),
            classes: vec![start_class.to_string()],
        },
        goal: RuleSide {
            domain: goal_domain.to_string(),
            classes: vec![goal_class.to_string()],
        },
        result: RuleResult {
            query: "{{ id }}".to_string(),
        },
    }
}
