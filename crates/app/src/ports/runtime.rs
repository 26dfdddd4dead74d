//! Query runtime port — the graph store's query language.
//!
//! The engine never interprets query text. It hands stored queries to a
//! [`QueryRuntime`] together with an [`ExecContext`] that carries the
//! identity, view and transaction to use. The runtime reports every graph
//! edit it makes back through [`ExecContext::emit`] so triggers can fire
//! inside the same transaction.

use nodehook_domain::error::NodehookError;
use nodehook_domain::id::ViewId;
use nodehook_domain::mutation::TxnId;
use nodehook_domain::node::NodeRef;

use crate::execution::ExecContext;

/// A graph store that can run query text.
///
/// Calls are synchronous: trigger queries run inline inside the write that
/// caused them, before that write returns.
pub trait QueryRuntime: Send + Sync {
    /// Open a write transaction in `view`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Query`] if the store cannot open one.
    fn begin(&self, view: ViewId) -> Result<TxnId, NodehookError>;

    /// Commit a transaction opened with [`QueryRuntime::begin`]. Edits made
    /// before a failure inside the transaction are kept.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Query`] for an unknown transaction.
    fn commit(&self, txn: TxnId) -> Result<(), NodehookError>;

    /// Run `query` with `inbound` as its starting node set and return the
    /// resulting node set.
    ///
    /// Every operation must be checked with [`ExecContext::require`] and
    /// every graph edit reported with [`ExecContext::emit`].
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Query`] for syntax or runtime failures and
    /// [`NodehookError::PermissionDenied`] for unauthorized operations.
    fn execute(
        &self,
        ctx: &mut ExecContext<'_>,
        query: &str,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError>;
}
