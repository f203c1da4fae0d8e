//! The opaque domain record the core shuffles around without interpreting.

use std::fmt;
use std::sync::Arc;

/// A deterministic, collision-free identity key for an [`Object`].
///
/// It is the domain's responsibility to choose the key shape (e.g.
/// `namespace/name/uid` for k8s, `timestamp+labels` for a metric sample, the
/// full record string for a log line). Equality of `ObjectId` defines object
/// identity for de-duplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        ObjectId(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        ObjectId(s.to_string())
    }
}

/// A domain-specific record: a log line, a metric sample, a k8s resource, an
/// alert, a trace span, ...
///
/// The core never interprets the contents of an `Object`; it only asks for
/// [`Object::identifier`] (de-duplication) and [`Object::as_any`] (so rule
/// templates and domain-specific code can downcast back to the concrete
/// type). Domains provide their own constructors and accessors on the
/// concrete types that implement this trait.
pub trait Object: fmt::Debug + Send + Sync {
    /// A deterministic, collision-free identity key used for de-duplication.
    fn identifier(&self) -> ObjectId;

    /// An optional event timestamp, used by the engine to enforce a
    /// [`crate::query::Constraint`]'s time window. Domains whose objects
    /// aren't timestamped (or that don't want window filtering) return
    /// `None`, in which case the window constraint is a no-op for them.
    fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        None
    }

    /// Native representation exposed to the template layer (e.g. as JSON),
    /// so rule templates can access fields like `{{.Namespace}}`.
    fn template_context(&self) -> serde_json::Value;

    /// Downcasting hook so domain code (and tests) can recover the concrete
    /// type behind a `dyn Object`.
    fn as_any(&self) -> &dyn std::any::Any;
}

pub type ObjectRef = Arc<dyn Object>;
