//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`NodehookError`] via `#[from]`.

/// Top-level error shared by every layer.
#[derive(Debug, thiserror::Error)]
pub enum NodehookError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("permission denied: {0}")]
    PermissionDenied(#[from] PermissionError),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A definition or input was rejected before anything was persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("query body must not be empty")]
    EmptyQuery,
    #[error("invalid form name: {0:?}")]
    InvalidForm(String),
    #[error("invalid property name: {0:?}")]
    InvalidProp(String),
    #[error("invalid tag: {0:?}")]
    InvalidTag(String),
    #[error("invalid tag pattern: {0:?}")]
    InvalidTagPattern(String),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("invalid macro name: {0:?}")]
    InvalidMacroName(String),
    #[error("invalid permission path: {0:?}")]
    InvalidPermission(String),
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
    #[error("malformed mutation: {0}")]
    MalformedMutation(String),
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
    #[error("view {0} has no parent to inherit from")]
    NotAFork(String),
    #[error("{0} already exists")]
    Duplicate(String),
}

/// A looked-up record does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// An identity attempted an operation it is not allowed to perform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("user {user:?} may not {perm}")]
pub struct PermissionError {
    pub user: String,
    pub perm: String,
}

/// A query failed while executing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The query text could not be parsed by the runtime.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// The query raised an error while running.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// A resource the query depends on is unavailable.
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    /// Nested trigger or macro invocations exceeded the configured depth.
    #[error("recursion limit {depth} exceeded: {chain}")]
    RecursionLimit { depth: usize, chain: String },
}

impl NodehookError {
    /// Wrap any storage-layer error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}
