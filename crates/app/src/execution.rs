//! Execution context manager.
//!
//! Every query the engine runs goes through an [`ExecContext`]: it carries
//! the identity the query runs as, the view and transaction it writes to,
//! and the stack of nested invocations that led to it. The query runtime
//! reports each graph edit to the context, which dispatches matching
//! triggers inline before the edit returns.
//!
//! Identity rules:
//! - a direct run uses the supplied user;
//! - a trigger runs as its creator, whoever caused the event;
//! - a macro runs as whoever invokes it, which inside a trigger or cron job
//!   is that definition's creator.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use nodehook_domain::error::{NodehookError, PermissionError, QueryError};
use nodehook_domain::event::{Event, EventType};
use nodehook_domain::id::{CronId, DmonId, TriggerId, UserId, ViewId};
use nodehook_domain::mutation::{MutationEvent, RawMutation, TxnId};
use nodehook_domain::node::NodeRef;
use nodehook_domain::trigger::TriggerDef;
use nodehook_domain::user::{Permission, User};

use crate::identity::{self, UserDirectory};
use crate::macro_store::MacroStore;
use crate::ports::{EventPublisher, QueryRuntime};
use crate::trigger_registry::TriggerRegistry;

/// Default limit on nested trigger and macro invocations.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// One level of nested invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Query,
    Trigger(TriggerId),
    Macro(String),
    Cron(CronId),
    Dmon(DmonId),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Trigger(id) => write!(f, "trigger:{id}"),
            Self::Macro(name) => write!(f, "macro:{name}"),
            Self::Cron(id) => write!(f, "cron:{id}"),
            Self::Dmon(id) => write!(f, "dmon:{id}"),
        }
    }
}

/// Entry point for running stored and ad-hoc queries.
pub struct ExecutionManager {
    runtime: Arc<dyn QueryRuntime>,
    triggers: Arc<TriggerRegistry>,
    macros: Arc<MacroStore>,
    users: Arc<UserDirectory>,
    publisher: Arc<dyn EventPublisher>,
    max_depth: usize,
}

impl ExecutionManager {
    /// Create a manager with the default nesting limit.
    pub fn new(
        runtime: Arc<dyn QueryRuntime>,
        triggers: Arc<TriggerRegistry>,
        macros: Arc<MacroStore>,
        users: Arc<UserDirectory>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            runtime,
            triggers,
            macros,
            users,
            publisher,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the nesting limit.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    #[must_use]
    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    #[must_use]
    pub fn macros(&self) -> &MacroStore {
        &self.macros
    }

    #[must_use]
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Run `query` as `user` in a transaction of its own.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown user,
    /// [`NodehookError::PermissionDenied`] at the first unauthorized
    /// operation, or [`NodehookError::Query`] when the query fails. Edits
    /// applied before a failure are committed.
    pub fn run(
        &self,
        query: &str,
        user: UserId,
        view: ViewId,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        self.run_as(Frame::Query, query, user, view, inbound)
    }

    /// Like [`ExecutionManager::run`], labelling the run with `frame`.
    ///
    /// # Errors
    ///
    /// See [`ExecutionManager::run`].
    pub fn run_as(
        &self,
        frame: Frame,
        query: &str,
        user: UserId,
        view: ViewId,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        let user = self.users.resolve(user)?;
        self.in_txn(user, view, |ctx| ctx.nest(frame, None, query, inbound))
    }

    /// Invoke the macro `name` directly as `user`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown macro, otherwise
    /// see [`ExecutionManager::run`].
    pub fn exec_macro(
        &self,
        name: &str,
        user: UserId,
        view: ViewId,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        let user = self.users.resolve(user)?;
        self.in_txn(user, view, |ctx| ctx.call_macro(name, inbound))
    }

    /// Report a mutation written by `user` outside of any engine-run query,
    /// inside the store's open transaction `txn`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] for a malformed mutation.
    /// Trigger failures are recorded, never returned.
    pub fn dispatch(
        &self,
        user: UserId,
        view: ViewId,
        txn: TxnId,
        raw: RawMutation,
    ) -> Result<(), NodehookError> {
        let user = self.users.resolve(user)?;
        ExecContext::new(self, user, view, txn).emit(raw)
    }

    fn in_txn<F>(
        &self,
        user: Arc<User>,
        view: ViewId,
        body: F,
    ) -> Result<Vec<NodeRef>, NodehookError>
    where
        F: FnOnce(&mut ExecContext<'_>) -> Result<Vec<NodeRef>, NodehookError>,
    {
        let txn = self.runtime.begin(view)?;
        let mut ctx = ExecContext::new(self, user, view, txn);
        let result = body(&mut ctx);
        // Partial effects stay: commit whether or not the body failed.
        let committed = self.runtime.commit(txn);
        let outbound = result?;
        committed?;
        Ok(outbound)
    }
}

/// The identity, view, transaction and call stack of a running query.
pub struct ExecContext<'a> {
    manager: &'a ExecutionManager,
    user: Arc<User>,
    view: ViewId,
    txn: TxnId,
    frames: Vec<Frame>,
}

impl<'a> ExecContext<'a> {
    fn new(manager: &'a ExecutionManager, user: Arc<User>, view: ViewId, txn: TxnId) -> Self {
        Self {
            manager,
            user,
            view,
            txn,
            frames: Vec::new(),
        }
    }

    /// The identity the current frame runs as.
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn view(&self) -> ViewId {
        self.view
    }

    #[must_use]
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Number of nested invocations currently running.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The invocation chain, outermost first.
    #[must_use]
    pub fn chain(&self) -> String {
        self.frames
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Check that the current identity holds `perm`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] otherwise.
    pub fn require(&self, perm: &Permission) -> Result<(), NodehookError> {
        identity::require(&self.user, perm)
    }

    /// Report a graph edit and run every trigger it matches, inline, before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when the mutation is malformed.
    /// Trigger failures are recorded and published, never returned.
    pub fn emit(&mut self, raw: RawMutation) -> Result<(), NodehookError> {
        let event = MutationEvent::normalize(self.view, self.txn, raw)?;
        let manager = self.manager;
        for trigger in manager.triggers.matching(&event) {
            // A trigger disabled or deleted by an earlier one in this batch
            // must not run.
            if !manager.triggers.is_live(event.view, trigger.id) {
                tracing::debug!(trigger_id = %trigger.id, "skipping trigger removed mid-dispatch");
                continue;
            }
            self.fire(&trigger, &event);
        }
        Ok(())
    }

    /// Invoke the macro `name` as the current identity.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown macro, and
    /// propagates any failure of the macro body.
    pub fn call_macro(
        &mut self,
        name: &str,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        let mac = self.manager.macros.get(name)?;
        self.nest(Frame::Macro(mac.name), None, &mac.query, inbound)
    }

    fn fire(&mut self, trigger: &TriggerDef, event: &MutationEvent) {
        let manager = self.manager;
        let outcome = match manager.users.resolve(trigger.creator) {
            Ok(creator) => self.nest(
                Frame::Trigger(trigger.id),
                Some(creator),
                &trigger.query,
                vec![event.node.clone()],
            ),
            Err(err) => Err(err),
        };

        let data = json!({
            "trigger": trigger.id.to_string(),
            "condition": trigger.condition.to_string(),
            "node": event.node.to_string(),
            "txn": event.txn.0,
        });
        match outcome {
            Ok(_) => {
                manager.triggers.record_success(trigger);
                tracing::debug!(trigger_id = %trigger.id, view = %event.view, "trigger fired");
                manager
                    .publisher
                    .publish(Event::new(EventType::TriggerFired, Some(event.view), data));
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(
                    trigger_id = %trigger.id,
                    view = %event.view,
                    node = %event.node,
                    error = %message,
                    "trigger failed"
                );
                manager.triggers.record_failure(trigger, message.clone());
                let mut data = data;
                data["error"] = json!(message);
                manager
                    .publisher
                    .publish(Event::new(EventType::TriggerFailed, Some(event.view), data));
            }
        }
    }

    /// Run `query` one level deeper, optionally as another identity.
    fn nest(
        &mut self,
        frame: Frame,
        user: Option<Arc<User>>,
        query: &str,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        let manager = self.manager;
        if self.frames.len() >= manager.max_depth {
            let chain = if self.frames.is_empty() {
                frame.to_string()
            } else {
                format!("{} > {frame}", self.chain())
            };
            return Err(QueryError::RecursionLimit {
                depth: manager.max_depth,
                chain,
            }
            .into());
        }
        let runner = user.as_deref().unwrap_or(&*self.user);
        if runner.locked {
            return Err(PermissionError {
                user: runner.name.clone(),
                perm: "run queries".to_string(),
            }
            .into());
        }

        let saved = user.map(|user| std::mem::replace(&mut self.user, user));
        self.frames.push(frame);
        let result = manager.runtime.execute(self, query, inbound);
        self.frames.pop();
        if let Some(saved) = saved {
            self.user = saved;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use nodehook_domain::trigger::TriggerCondition;

    fn fqdn_added_trigger(harness: &Harness, creator: UserId, query: &str) -> TriggerDef {
        let trigger = TriggerDef::builder()
            .view(harness.view.id)
            .creator(creator)
            .condition(TriggerCondition::NodeAdd {
                form: "inet:fqdn".to_string(),
            })
            .query(query)
            .build()
            .unwrap();
        harness.registry.register(trigger.clone());
        trigger
    }

    #[test]
    fn should_run_query_as_user_and_commit() {
        let harness = Harness::new();
        let out = harness
            .manager
            .run("add inet:fqdn vertex.link", harness.admin.id, harness.view.id, vec![])
            .unwrap();
        assert_eq!(out, vec![NodeRef::new("inet:fqdn", "vertex.link")]);
        assert_eq!(harness.runtime.committed(), 1);
        assert_eq!(
            harness.runtime.runs(),
            vec![("root".to_string(), "add inet:fqdn vertex.link".to_string())]
        );
    }

    #[test]
    fn should_fail_at_first_unauthorized_operation_and_keep_earlier_edits() {
        let harness = Harness::new();
        let bob = harness.user("bob", &["node.add.inet:fqdn"]);

        let err = harness
            .manager
            .run(
                "add inet:fqdn vertex.link; tag cno.mal",
                bob.id,
                harness.view.id,
                vec![],
            )
            .unwrap_err();

        assert!(matches!(err, NodehookError::PermissionDenied(_)));
        assert_eq!(harness.runtime.nodes(), vec![NodeRef::new("inet:fqdn", "vertex.link")]);
        assert!(harness.runtime.tags().is_empty());
        assert_eq!(harness.runtime.committed(), 1, "partial edits are committed");
    }

    #[test]
    fn should_fire_trigger_inline_as_its_creator() {
        let harness = Harness::new();
        let alice = harness.user("alice", &["node.tag.add.seen"]);
        let bob = harness.user("bob", &["node.add.inet:fqdn"]);
        fqdn_added_trigger(&harness, alice.id, "tag seen");

        harness
            .manager
            .run("add inet:fqdn vertex.link", bob.id, harness.view.id, vec![])
            .unwrap();

        assert_eq!(
            harness.runtime.tags(),
            vec![(NodeRef::new("inet:fqdn", "vertex.link"), "seen".to_string())]
        );
        let runs = harness.runtime.runs();
        assert_eq!(runs[1], ("alice".to_string(), "tag seen".to_string()));
        assert_eq!(harness.runtime.committed(), 1, "trigger shares the write's transaction");
    }

    #[test]
    fn should_record_trigger_failure_without_failing_write() {
        let harness = Harness::new();
        let mut events = harness.bus.subscribe();
        let trigger = fqdn_added_trigger(&harness, harness.admin.id, "fail");

        let result = harness.manager.run(
            "add inet:fqdn vertex.link",
            harness.admin.id,
            harness.view.id,
            vec![],
        );

        assert!(result.is_ok());
        let stats = harness.registry.stats(&trigger);
        assert_eq!(stats.failed, 1);
        assert!(stats.last_error.unwrap().contains("boom"));
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::TriggerFailed);
        assert_eq!(event.data["trigger"], trigger.id.to_string());
    }

    #[test]
    fn should_run_matching_triggers_in_creation_order() {
        let harness = Harness::new();
        fqdn_added_trigger(&harness, harness.admin.id, "tag first");
        fqdn_added_trigger(&harness, harness.admin.id, "tag second");

        harness
            .manager
            .run("add inet:fqdn vertex.link", harness.admin.id, harness.view.id, vec![])
            .unwrap();

        let tags: Vec<String> = harness.runtime.tags().into_iter().map(|(_, t)| t).collect();
        assert_eq!(tags, vec!["first", "second"]);
    }

    #[test]
    fn should_stop_runaway_trigger_chain_at_depth_limit() {
        let harness = Harness::with_max_depth(8);
        let trigger = TriggerDef::builder()
            .view(harness.view.id)
            .creator(harness.admin.id)
            .condition(TriggerCondition::TagAdd {
                tag: nodehook_domain::tag::TagPattern::parse("loop").unwrap(),
                form: None,
            })
            .query("tag loop")
            .build()
            .unwrap();
        harness.registry.register(trigger.clone());

        let result = harness.manager.run(
            "add inet:fqdn vertex.link; tag loop",
            harness.admin.id,
            harness.view.id,
            vec![],
        );

        assert!(result.is_ok());
        let stats = harness.registry.stats(&trigger);
        assert_eq!(stats.failed, 1, "only the innermost trigger hits the limit");
        let error = stats.last_error.unwrap();
        assert!(error.contains("recursion limit 8"), "{error}");
        assert!(error.contains(&format!("trigger:{}", trigger.id)));
    }

    #[test]
    fn should_deny_macro_invoked_directly_by_user_without_rights() {
        let harness = Harness::new();
        let alice = harness.user("alice", &["node.tag.add.secret"]);
        let bob = harness.user("bob", &["node.add.inet:fqdn"]);
        harness.macro_def("mark", "tag secret", alice.id);

        let err = harness
            .manager
            .exec_macro(
                "mark",
                bob.id,
                harness.view.id,
                vec![NodeRef::new("inet:fqdn", "vertex.link")],
            )
            .unwrap_err();

        assert!(matches!(err, NodehookError::PermissionDenied(_)));
        assert!(harness.runtime.tags().is_empty());
    }

    #[test]
    fn should_run_macro_as_trigger_creator_when_event_caused_by_other_user() {
        let harness = Harness::new();
        let alice = harness.user("alice", &["node.tag.add.secret"]);
        let bob = harness.user("bob", &["node.add.inet:fqdn"]);
        harness.macro_def("mark", "tag secret", alice.id);
        fqdn_added_trigger(&harness, alice.id, "macro mark");

        harness
            .manager
            .run("add inet:fqdn vertex.link", bob.id, harness.view.id, vec![])
            .unwrap();

        assert_eq!(
            harness.runtime.tags(),
            vec![(NodeRef::new("inet:fqdn", "vertex.link"), "secret".to_string())]
        );
        let trigger = harness.registry.list(harness.view.id)[0].clone();
        assert_eq!(harness.registry.stats(&trigger).failed, 0);
    }

    #[test]
    fn should_propagate_macro_failure_to_caller() {
        let harness = Harness::new();
        harness.macro_def("broken", "fail", harness.admin.id);

        let err = harness
            .manager
            .run("macro broken", harness.admin.id, harness.view.id, vec![])
            .unwrap_err();
        assert!(matches!(err, NodehookError::Query(QueryError::Runtime(_))));
    }

    #[test]
    fn should_return_not_found_for_unknown_macro() {
        let harness = Harness::new();
        let err = harness
            .manager
            .exec_macro("missing", harness.admin.id, harness.view.id, vec![])
            .unwrap_err();
        assert!(matches!(err, NodehookError::NotFound(_)));
    }

    #[test]
    fn should_refuse_to_run_as_locked_user() {
        let harness = Harness::new();
        let mut carol = harness.user("carol", &["node"]);
        carol.locked = true;
        harness.users.put(carol.clone());

        let err = harness
            .manager
            .run("noop", carol.id, harness.view.id, vec![])
            .unwrap_err();
        assert!(matches!(err, NodehookError::PermissionDenied(_)));
    }

    #[test]
    fn should_record_failure_when_trigger_creator_was_removed() {
        let harness = Harness::new();
        let trigger = fqdn_added_trigger(&harness, UserId::new(), "tag seen");

        harness
            .manager
            .run("add inet:fqdn vertex.link", harness.admin.id, harness.view.id, vec![])
            .unwrap();

        assert_eq!(harness.registry.stats(&trigger).failed, 1);
        assert!(harness.runtime.tags().is_empty());
    }

    #[test]
    fn should_reject_malformed_mutation_from_store() {
        let harness = Harness::new();
        let err = harness
            .manager
            .dispatch(
                harness.admin.id,
                harness.view.id,
                TxnId(1),
                RawMutation::NodeAdded {
                    node: NodeRef::new("Bad Form", "x"),
                },
            )
            .unwrap_err();
        assert!(matches!(err, NodehookError::Validation(_)));
    }

    #[test]
    fn should_dispatch_store_mutation_to_triggers() {
        let harness = Harness::new();
        let bob = harness.user("bob", &[]);
        fqdn_added_trigger(&harness, harness.admin.id, "tag seen");

        harness
            .manager
            .dispatch(
                bob.id,
                harness.view.id,
                TxnId(9),
                RawMutation::NodeAdded {
                    node: NodeRef::new("inet:fqdn", "vertex.link"),
                },
            )
            .unwrap();

        assert_eq!(harness.runtime.tags().len(), 1);
    }
}
