//! In-memory graph store implementing [`QueryRuntime`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use nodehook_app::execution::ExecContext;
use nodehook_app::ports::QueryRuntime;
use nodehook_domain::error::{NodehookError, QueryError};
use nodehook_domain::id::ViewId;
use nodehook_domain::mutation::{RawMutation, TxnId};
use nodehook_domain::node::NodeRef;
use nodehook_domain::user::Permission;

use crate::query::{Edit, Op, parse};

/// Properties and tags of one stored node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeData {
    pub props: BTreeMap<String, serde_json::Value>,
    pub tags: BTreeSet<String>,
}

type Layer = BTreeMap<NodeRef, NodeData>;

/// A graph store keeping one independent node layer per view.
///
/// Edits apply immediately; committing only closes the transaction, so a
/// failed query keeps the edits it made before failing.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    layers: Mutex<HashMap<ViewId, Layer>>,
    open: Mutex<HashMap<u64, ViewId>>,
    next_txn: AtomicU64,
}

impl MemoryGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node stored in `view`, in form/value order.
    #[must_use]
    pub fn nodes(&self, view: ViewId) -> Vec<NodeRef> {
        self.lock_layers()
            .get(&view)
            .map(|layer| layer.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Properties and tags of a node, if it exists in `view`.
    #[must_use]
    pub fn node(&self, view: ViewId, node: &NodeRef) -> Option<NodeData> {
        self.lock_layers().get(&view)?.get(node).cloned()
    }

    /// Number of transactions begun but not yet committed.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.lock_open().len()
    }

    fn lock_layers(&self) -> MutexGuard<'_, HashMap<ViewId, Layer>> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_open(&self) -> MutexGuard<'_, HashMap<u64, ViewId>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to the node's data, creating nothing. Returns `None`
    /// when the node does not exist.
    fn with_node<R>(
        &self,
        view: ViewId,
        node: &NodeRef,
        change: impl FnOnce(&mut NodeData) -> R,
    ) -> Option<R> {
        self.lock_layers()
            .get_mut(&view)?
            .get_mut(node)
            .map(change)
    }

    fn lift(&self, view: ViewId, node: &NodeRef) -> bool {
        self.lock_layers()
            .get(&view)
            .is_some_and(|layer| layer.contains_key(node))
    }

    fn create(&self, ctx: &mut ExecContext<'_>, node: &NodeRef) -> Result<(), NodehookError> {
        ctx.require(&Permission::node_add(&node.form))?;
        let added = {
            let mut layers = self.lock_layers();
            let layer = layers.entry(ctx.view()).or_default();
            if layer.contains_key(node) {
                false
            } else {
                layer.insert(node.clone(), NodeData::default());
                true
            }
        };
        if added {
            ctx.emit(RawMutation::NodeAdded { node: node.clone() })?;
        }
        Ok(())
    }

    fn add_tag(
        &self,
        ctx: &mut ExecContext<'_>,
        node: &NodeRef,
        tag: &str,
    ) -> Result<(), NodehookError> {
        ctx.require(&Permission::tag_add(tag))?;
        // Adding `a.b.c` also adds `a` and `a.b`.
        let mut path = String::new();
        let mut added = Vec::new();
        for segment in tag.split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(segment);
            added.push(path.clone());
        }
        let added = self
            .with_node(ctx.view(), node, |data| {
                added
                    .into_iter()
                    .filter(|tag| data.tags.insert(tag.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for tag in added {
            ctx.emit(RawMutation::TagAdded {
                node: node.clone(),
                tag,
                interval: None,
            })?;
        }
        Ok(())
    }

    fn del_tag(
        &self,
        ctx: &mut ExecContext<'_>,
        node: &NodeRef,
        tag: &str,
    ) -> Result<(), NodehookError> {
        ctx.require(&Permission::tag_del(tag))?;
        // Removing `a.b` also removes `a.b.c`.
        let prefix = format!("{tag}.");
        let removed = self
            .with_node(ctx.view(), node, |data| {
                let removed: Vec<String> = data
                    .tags
                    .iter()
                    .filter(|t| *t == tag || t.starts_with(&prefix))
                    .rev()
                    .cloned()
                    .collect();
                for t in &removed {
                    data.tags.remove(t);
                }
                removed
            })
            .unwrap_or_default();
        for tag in removed {
            ctx.emit(RawMutation::TagDeleted {
                node: node.clone(),
                tag,
            })?;
        }
        Ok(())
    }

    /// Set `prop` on `node`. The initial set and every overwrite with a
    /// different value emit a prop-set mutation. Writing the value the
    /// property already holds is a no-op and emits nothing, so prop-set
    /// triggers do not fire for it.
    fn set_prop(
        &self,
        ctx: &mut ExecContext<'_>,
        node: &NodeRef,
        prop: &str,
        value: &serde_json::Value,
    ) -> Result<(), NodehookError> {
        ctx.require(&Permission::prop_set(&format!("{}:{prop}", node.form)))?;
        let changed = self
            .with_node(ctx.view(), node, |data| {
                let old = data.props.insert(prop.to_string(), value.clone());
                (old.as_ref() != Some(value)).then_some(old)
            })
            .flatten();
        if let Some(old) = changed {
            ctx.emit(RawMutation::PropSet {
                node: node.clone(),
                prop: prop.to_string(),
                old,
                new: value.clone(),
            })?;
        }
        Ok(())
    }

    fn delete(&self, ctx: &mut ExecContext<'_>, node: &NodeRef) -> Result<(), NodehookError> {
        ctx.require(&Permission::node_del(&node.form))?;
        let removed = self
            .lock_layers()
            .get_mut(&ctx.view())
            .and_then(|layer| layer.remove(node))
            .is_some();
        if removed {
            ctx.emit(RawMutation::NodeDeleted { node: node.clone() })?;
        }
        Ok(())
    }

    fn apply_edits(
        &self,
        ctx: &mut ExecContext<'_>,
        edits: &[Edit],
        nodes: &mut Vec<NodeRef>,
    ) -> Result<(), NodehookError> {
        for edit in edits {
            match edit {
                Edit::Create(node) => {
                    self.create(ctx, node)?;
                    if !nodes.contains(node) {
                        nodes.push(node.clone());
                    }
                }
                Edit::AddTag(tag) => {
                    for node in &*nodes {
                        self.add_tag(ctx, node, tag)?;
                    }
                }
                Edit::DelTag(tag) => {
                    for node in &*nodes {
                        self.del_tag(ctx, node, tag)?;
                    }
                }
                Edit::SetProp { prop, value } => {
                    for node in &*nodes {
                        self.set_prop(ctx, node, prop, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl QueryRuntime for MemoryGraph {
    fn begin(&self, view: ViewId) -> Result<TxnId, NodehookError> {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock_open().insert(id, view);
        Ok(TxnId(id))
    }

    fn commit(&self, txn: TxnId) -> Result<(), NodehookError> {
        match self.lock_open().remove(&txn.0) {
            Some(_) => Ok(()),
            None => Err(QueryError::Runtime(format!("unknown transaction {txn}")).into()),
        }
    }

    #[tracing::instrument(
        skip(self, ctx, inbound),
        fields(user = %ctx.user().name, view = %ctx.view())
    )]
    fn execute(
        &self,
        ctx: &mut ExecContext<'_>,
        query: &str,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        let ops = parse(query)?;
        let view = ctx.view();
        let mut nodes = inbound;

        for op in &ops {
            match op {
                Op::Lift(node) => {
                    if self.lift(view, node) && !nodes.contains(node) {
                        nodes.push(node.clone());
                    }
                }
                Op::Edit(edits) => self.apply_edits(ctx, edits, &mut nodes)?,
                Op::FilterForm { keep, form } => {
                    nodes.retain(|node| (node.form == *form) == *keep);
                }
                Op::FilterTag { keep, pattern } => {
                    let layers = self.lock_layers();
                    let layer = layers.get(&view);
                    nodes.retain(|node| {
                        let tagged = layer
                            .and_then(|layer| layer.get(node))
                            .is_some_and(|data| data.tags.iter().any(|t| pattern.matches(t)));
                        tagged == *keep
                    });
                }
                Op::DelNode => {
                    for node in std::mem::take(&mut nodes) {
                        self.delete(ctx, &node)?;
                    }
                }
                Op::MacroExec(name) => nodes = ctx.call_macro(name, nodes)?,
                Op::Raise => {
                    return Err(QueryError::Runtime("query raised an error".to_string()).into());
                }
            }
        }
        Ok(nodes)
    }
}
