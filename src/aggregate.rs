//! Result aggregation: de-duplicated, insertion-ordered, constraint-filtered
//! object buffers.

use crate::object::{ObjectId, ObjectRef};
use crate::query::Constraint;
use std::collections::HashSet;
use std::sync::Mutex;

/// Accepts objects, de-duplicates them by [`crate::object::Object::identifier`]
/// in an insertion-ordered container, and applies [`Constraint`] filtering.
///
/// Appends are serialised behind a fine-grained mutex rather than a channel:
/// throughput here is not a concern relative to store latency, and a short
/// critical section over a `Vec`/`HashSet` push is cheaper than standing up
/// an aggregator task per node.
pub struct Appender {
    constraint: Option<Constraint>,
    inner: Mutex<Inner>,
}

struct Inner {
    seen: HashSet<ObjectId>,
    objects: Vec<ObjectRef>,
    truncated: bool,
}

impl Appender {
    pub fn new(constraint: Option<Constraint>) -> Self {
        Appender {
            constraint,
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                objects: Vec::new(),
                truncated: false,
            }),
        }
    }

    /// Appends `object` unless it is outside the constraint's time window,
    /// is already present (by identifier, first-seen wins), or the
    /// constraint's limit has already been reached.
    ///
    /// Returns `true` if the object was appended.
    pub fn append(&self, object: ObjectRef) -> bool {
        if let Some(constraint) = &self.constraint {
            if let Some(ts) = object.timestamp() {
                if !constraint.allows_timestamp(ts) {
                    return false;
                }
            }
        }

        let mut inner = self.inner.lock().expect("lock poisoned");
        if let Some(limit) = self.constraint.as_ref().and_then(|c| c.limit) {
            if inner.objects.len() >= limit {
                inner.truncated = true;
                return false;
            }
        }

        let id = object.identifier();
        if !inner.seen.insert(id) {
            return false;
        }
        inner.objects.push(object);
        true
    }

    pub fn list(&self) -> Vec<ObjectRef> {
        self.inner.lock().expect("lock poisoned").objects.clone()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().expect("lock poisoned").objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether objects were dropped because the optional per-node cap
    /// (`Constraint::limit`) was reached.
    pub fn truncated(&self) -> bool {
        self.inner.lock().expect("lock poisoned").truncated
    }
}
