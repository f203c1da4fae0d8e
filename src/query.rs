//! A (Class, domain-specific body) pair, and the optional [`Constraint`]
//! applied to its results.

use crate::class::Class;
use crate::identity::{format_class_data, split_class_data};
use chrono::{DateTime, Utc};

/// A query against a single class: the domain-specific `body` is opaque to
/// the core and is parsed by the owning [`crate::domain::Domain::parse_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    domain: String,
    class: String,
    body: String,
}

impl Query {
    pub fn new(domain: impl Into<String>, class: impl Into<String>, body: impl Into<String>) -> Self {
        Query {
            domain: domain.into(),
            class: class.into(),
            body: body.into(),
        }
    }

    pub fn for_class(class: &Class, body: impl Into<String>) -> Self {
        Query::new(class.domain(), class.name(), body)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn full_class_name(&self) -> String {
        format!("{}:{}", self.domain, self.class)
    }

    /// Stringifies as `"<domain>:<class>:<body>"`.
    pub fn to_wire_string(&self) -> String {
        format_class_data(&self.domain, &self.class, &self.body)
    }

    /// Parses `"<domain>:<class>:<body>"`. Does not validate that `domain`
    /// and `class` are registered; that is the engine's job, since only the
    /// engine knows the registry.
    pub fn from_wire_string(s: &str) -> Option<Self> {
        let (domain, class, body) = split_class_data(s)?;
        Some(Query::new(domain, class, body))
    }
}

/// Optional `{start, end, limit}` applied to query results.
///
/// Stores *should* honour this as a push-down optimisation where they can,
/// but it is not a contract: the engine always re-applies it as a
/// post-filter, so behaviour is correct even against a store that ignores
/// it entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl Constraint {
    pub fn with_limit(limit: usize) -> Self {
        Constraint {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Constraint {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    /// Whether a timestamp falls within `[start, end]` (inclusive), treating
    /// an unset bound as unbounded on that side.
    pub fn allows_timestamp(&self, ts: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if ts < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if ts > end {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_roundtrips_through_wire_string() {
        let q = Query::new("log", "application", "{pod=\"x\"}");
        let wire = q.to_wire_string();
        assert_eq!(wire, "log:application:{pod=\"x\"}");
        let parsed = Query::from_wire_string(&wire).expect("parse");
        assert_eq!(parsed, q);
    }

    #[test]
    fn query_body_may_contain_colons() {
        let wire = "mock:a:[\"x\",\"y:z\"]";
        let q = Query::from_wire_string(wire).expect("parse");
        assert_eq!(q.body(), "[\"x\",\"y:z\"]");
        assert_eq!(q.to_wire_string(), wire);
    }

    #[test]
    fn constraint_window_is_inclusive() {
        use chrono::TimeZone;
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let c = Constraint::with_window(start, end);
        assert!(c.allows_timestamp(start));
        assert!(c.allows_timestamp(end));
        assert!(!c.allows_timestamp(end + chrono::Duration::seconds(1)));
    }
}
