//! Store mutations and their canonical event form.
//!
//! The store reports every write as a [`RawMutation`]. Before trigger
//! matching it is normalized into a [`MutationEvent`] that carries the
//! owning view, the node's form, the full property path or normalized tag,
//! and the handle of the transaction that produced it.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::ViewId;
use crate::node::{NodeRef, TagInterval, validate_form};
use crate::tag::normalize_tag;

/// Handle of an open write transaction in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// A write as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawMutation {
    NodeAdded {
        node: NodeRef,
    },
    NodeDeleted {
        node: NodeRef,
    },
    PropSet {
        node: NodeRef,
        /// Property name relative to the node's form, e.g. `asn`.
        prop: String,
        old: Option<serde_json::Value>,
        new: serde_json::Value,
    },
    TagAdded {
        node: NodeRef,
        tag: String,
        interval: Option<TagInterval>,
    },
    TagDeleted {
        node: NodeRef,
        tag: String,
    },
}

impl RawMutation {
    /// The node the mutation applies to.
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        match self {
            Self::NodeAdded { node }
            | Self::NodeDeleted { node }
            | Self::PropSet { node, .. }
            | Self::TagAdded { node, .. }
            | Self::TagDeleted { node, .. } => node,
        }
    }
}

/// The condition kind an event (and a trigger) is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeAdd,
    NodeDel,
    PropSet,
    TagAdd,
    TagDel,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NodeAdd => "node:add",
            Self::NodeDel => "node:del",
            Self::PropSet => "prop:set",
            Self::TagAdd => "tag:add",
            Self::TagDel => "tag:del",
        })
    }
}

/// Canonical mutation record used for trigger matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub kind: EventKind,
    pub view: ViewId,
    pub form: String,
    /// Full property path (`form:prop`) for `prop:set` events.
    pub prop: Option<String>,
    /// Normalized tag for `tag:add` / `tag:del` events.
    pub tag: Option<String>,
    pub node: NodeRef,
    pub txn: TxnId,
}

impl MutationEvent {
    /// Normalize a raw store mutation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedMutation`] when the node, property
    /// or tag in the mutation is not well formed. Malformed mutations are
    /// surfaced to the store rather than dropped, so a trigger never silently
    /// misses an event.
    pub fn normalize(
        view: ViewId,
        txn: TxnId,
        raw: RawMutation,
    ) -> Result<Self, ValidationError> {
        let malformed = |what: String| ValidationError::MalformedMutation(what);

        validate_form(&raw.node().form)
            .map_err(|_| malformed(format!("bad form {:?}", raw.node().form)))?;
        if raw.node().value.is_empty() {
            return Err(malformed(format!(
                "empty primary value for {}",
                raw.node().form
            )));
        }

        let (kind, prop, tag, node) = match raw {
            RawMutation::NodeAdded { node } => (EventKind::NodeAdd, None, None, node),
            RawMutation::NodeDeleted { node } => (EventKind::NodeDel, None, None, node),
            RawMutation::PropSet { node, prop, .. } => {
                let relative = prop.trim_start_matches(':');
                if !crate::node::is_valid_path(relative, ':') {
                    return Err(malformed(format!("bad property {prop:?} on {node}")));
                }
                let full = format!("{}:{relative}", node.form);
                (EventKind::PropSet, Some(full), None, node)
            }
            RawMutation::TagAdded { node, tag, .. } => {
                let tag = normalize_tag(&tag).map_err(|err| malformed(err.to_string()))?;
                (EventKind::TagAdd, None, Some(tag), node)
            }
            RawMutation::TagDeleted { node, tag } => {
                let tag = normalize_tag(&tag).map_err(|err| malformed(err.to_string()))?;
                (EventKind::TagDel, None, Some(tag), node)
            }
        };

        Ok(Self {
            kind,
            view,
            form: node.form.clone(),
            prop,
            tag,
            node,
            txn,
        })
    }
}
