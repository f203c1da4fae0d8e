//! `domain:class[:data]` parsing and formatting.
//!
//! These are pure functions with no engine state; the engine uses them to
//! parse wire-form class and query names, but they never consult the domain
//! registry themselves (that happens one layer up, in [`crate::engine`]).

/// Splits `"domain:class"` into its two parts. Rejects empty sides.
pub fn split_class_name(s: &str) -> Option<(&str, &str)> {
    let (domain, class) = s.split_once(':')?;
    if domain.is_empty() || class.is_empty() {
        return None;
    }
    Some((domain, class))
}

/// Splits `"domain:class:data"` into its three parts. `data` may contain
/// further colons; only the first two separators are significant.
pub fn split_class_data(s: &str) -> Option<(&str, &str, &str)> {
    let (domain, rest) = s.split_once(':')?;
    let (class, data) = rest.split_once(':')?;
    if domain.is_empty() || class.is_empty() {
        return None;
    }
    Some((domain, class, data))
}

/// Renders `"domain:class"`. Round-trips with [`split_class_name`].
pub fn format_class_name(domain: &str, class: &str) -> String {
    format!("{domain}:{class}")
}

/// Renders `"domain:class:data"`. Round-trips with [`split_class_data`].
pub fn format_class_data(domain: &str, class: &str, data: &str) -> String {
    format!("{domain}:{class}:{data}")
}
