pub mod aggregate;
pub mod class;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod identity;
pub mod metrics;
pub mod object;
pub mod query;
pub mod result;
pub mod rule;
pub mod store;
pub mod template;
pub mod traversal;

pub use class::Class;
pub use domain::{Domain, DomainRegistry};
pub use engine::{Engine, EngineBuilder};
pub use error::{ConfigError, EngineError};
pub use object::{Object, ObjectId, ObjectRef};
pub use query::{Constraint, Query};
pub use result::{GraphView, ResultGraph};
pub use rule::{Rule, RuleDef};
pub use store::{Store, StoreConfig};
pub use traversal::{goals, neighbourhood, TraversalConfig};
