//! A schema within a domain (e.g. `k8s:Pod`, `log:application`).

use crate::identity::format_class_name;
use crate::object::ObjectRef;
use std::fmt;
use std::sync::Arc;

/// A zero-value object constructor, used when the engine needs a starting
/// point before any real object exists (e.g. to seed an empty node).
pub type EmptyObjectFn = Arc<dyn Fn() -> ObjectRef + Send + Sync>;

/// A one-line preview renderer for an object of this class, used for
/// debugging/inspection output. Optional: classes that don't implement one
/// fall back to the object's `Debug` output.
pub type PreviewFn = Arc<dyn Fn(&ObjectRef) -> String + Send + Sync>;

/// A triple of (domain, name, schema-description). Classes are
/// value-comparable: two `Class`es are equal iff their domain and name match,
/// regardless of their function pointers.
#[derive(Clone)]
pub struct Class {
    domain: String,
    name: String,
    description: String,
    empty_object: Option<EmptyObjectFn>,
    preview: Option<PreviewFn>,
}

impl Class {
    pub fn new(domain: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Class {
            domain: domain.into(),
            name: name.into(),
            description: description.into(),
            empty_object: None,
            preview: None,
        }
    }

    pub fn with_empty_object(mut self, f: EmptyObjectFn) -> Self {
        self.empty_object = Some(f);
        self
    }

    pub fn with_preview(mut self, f: PreviewFn) -> Self {
        self.preview = Some(f);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Fully qualified name: `"<domain>:<class>"`.
    pub fn full_name(&self) -> String {
        format_class_name(&self.domain, &self.name)
    }

    pub fn empty_object(&self) -> Option<ObjectRef> {
        self.empty_object.as_ref().map(|f| f())
    }

    pub fn preview(&self, obj: &ObjectRef) -> Option<String> {
        self.preview.as_ref().map(|f| f(obj))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.name == other.name
    }
}

impl Eq for Class {}

impl std::hash::Hash for Class {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.domain.hash(state);
        self.name.hash(state);
    }
}
