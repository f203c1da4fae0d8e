use thiserror::Error;

/// Errors raised while building an [`crate::engine::Engine`] from configuration:
/// domain/store/rule registration and config/template expansion.
///
/// Config-level errors never abort engine construction on their own; they
/// are attached to the offending rule/store and surfaced by the caller (e.g.
/// via a `/domains` inspection endpoint); `ConfigError` is the value that
/// gets attached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("domain not found: {0}")]
    DomainNotFound(String),
    #[error("class not found: {0}:{1}")]
    ClassNotFound(String, String),
    #[error("invalid rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("template error: {0}")]
    Template(String),
    #[error("store construction failed: {0}")]
    StoreConstruction(String),
    #[error("include cycle detected: {0}")]
    IncludeCycle(String),
    #[error("duplicate domain: {0}")]
    DuplicateDomain(String),
    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),
}

/// Errors raised while executing a traversal (goals or neighbourhood search).
///
/// Lookup failures are user-correctable, `StoreUnavailable`/`DeadlineExceeded`
/// are per-edge and best-effort by default, `Internal` is fatal to the whole
/// traversal.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("domain not found: {0}")]
    DomainNotFound(String),
    #[error("class not found: {0}:{1}")]
    ClassNotFound(String, String),
    #[error("store not found for domain: {0}")]
    StoreNotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("traversal cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error, when attached to a single edge in best-effort mode,
    /// should still allow sibling edges to proceed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Internal(_) | EngineError::Cancelled)
    }

    /// Low-cardinality label for the `correlate_engine_store_errors_total`
    /// metric.
    pub fn metric_kind(&self) -> &'static str {
        match self {
            EngineError::DomainNotFound(_) => "domain_not_found",
            EngineError::ClassNotFound(_, _) => "class_not_found",
            EngineError::StoreNotFound(_) => "store_not_found",
            EngineError::InvalidQuery(_) => "invalid_query",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::DeadlineExceeded => "deadline_exceeded",
            EngineError::Cancelled => "cancelled",
            EngineError::Internal(_) => "internal",
        }
    }
}
