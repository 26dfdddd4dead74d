//! Shared test doubles: a scripted query runtime and in-memory repositories.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nodehook_domain::cron::{CronJob, RunState};
use nodehook_domain::dmon::Dmon;
use nodehook_domain::error::{NodehookError, NotFoundError, QueryError};
use nodehook_domain::id::{CronId, DmonId, TriggerId, UserId, ViewId};
use nodehook_domain::macros::Macro;
use nodehook_domain::mutation::{RawMutation, TxnId};
use nodehook_domain::node::NodeRef;
use nodehook_domain::trigger::TriggerDef;
use nodehook_domain::user::{Permission, Rule, User};
use nodehook_domain::view::View;

use crate::event_bus::InProcessEventBus;
use crate::execution::{DEFAULT_MAX_DEPTH, ExecContext, ExecutionManager};
use crate::identity::UserDirectory;
use crate::macro_store::MacroStore;
use crate::ports::{
    CronRepository, DmonRepository, MacroRepository, QueryRuntime, TriggerRepository,
    UserRepository, ViewRepository,
};
use crate::trigger_registry::TriggerRegistry;

/// Runtime understanding `;`-separated steps:
/// `add FORM VALUE`, `tag TAG`, `macro NAME`, `sleep MS`, `fail`, `noop`.
#[derive(Default)]
pub(crate) struct ScriptRuntime {
    next_txn: AtomicU64,
    open: Mutex<HashSet<u64>>,
    committed: AtomicUsize,
    runs: Mutex<Vec<(String, String)>>,
    nodes: Mutex<Vec<NodeRef>>,
    tags: Mutex<Vec<(NodeRef, String)>>,
}

impl ScriptRuntime {
    pub(crate) fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    /// `(user name, query)` for every execution, in start order.
    pub(crate) fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().unwrap().clone()
    }

    pub(crate) fn nodes(&self) -> Vec<NodeRef> {
        self.nodes.lock().unwrap().clone()
    }

    pub(crate) fn tags(&self) -> Vec<(NodeRef, String)> {
        self.tags.lock().unwrap().clone()
    }
}

impl QueryRuntime for ScriptRuntime {
    fn begin(&self, _view: ViewId) -> Result<TxnId, NodehookError> {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.lock().unwrap().insert(id);
        Ok(TxnId(id))
    }

    fn commit(&self, txn: TxnId) -> Result<(), NodehookError> {
        if self.open.lock().unwrap().remove(&txn.0) {
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(QueryError::Runtime(format!("unknown transaction {txn}")).into())
        }
    }

    fn execute(
        &self,
        ctx: &mut ExecContext<'_>,
        query: &str,
        inbound: Vec<NodeRef>,
    ) -> Result<Vec<NodeRef>, NodehookError> {
        self.runs
            .lock()
            .unwrap()
            .push((ctx.user().name.clone(), query.to_string()));

        let mut current = inbound;
        for step in query.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let words: Vec<&str> = step.split_whitespace().collect();
            match words.as_slice() {
                ["add", form, value] => {
                    ctx.require(&Permission::node_add(form))?;
                    let node = NodeRef::new(*form, *value);
                    self.nodes.lock().unwrap().push(node.clone());
                    ctx.emit(RawMutation::NodeAdded { node: node.clone() })?;
                    current = vec![node];
                }
                ["tag", tag] => {
                    ctx.require(&Permission::tag_add(tag))?;
                    for node in &current {
                        self.tags
                            .lock()
                            .unwrap()
                            .push((node.clone(), (*tag).to_string()));
                        ctx.emit(RawMutation::TagAdded {
                            node: node.clone(),
                            tag: (*tag).to_string(),
                            interval: None,
                        })?;
                    }
                }
                ["macro", name] => current = ctx.call_macro(name, current)?,
                ["sleep", ms] => {
                    std::thread::sleep(std::time::Duration::from_millis(ms.parse().unwrap()));
                }
                ["fail"] => return Err(QueryError::Runtime("boom".to_string()).into()),
                ["noop"] => {}
                _ => return Err(QueryError::Syntax(step.to_string()).into()),
            }
        }
        Ok(current)
    }
}

pub(crate) fn permission_rule(path: &str) -> Rule {
    Rule::allow(Permission::parse(path).unwrap())
}

/// An execution manager wired to a [`ScriptRuntime`], one root view and an
/// admin user named `root`.
pub(crate) struct Harness {
    pub runtime: Arc<ScriptRuntime>,
    pub registry: Arc<TriggerRegistry>,
    pub macros: Arc<MacroStore>,
    pub users: Arc<UserDirectory>,
    pub bus: Arc<InProcessEventBus>,
    pub manager: Arc<ExecutionManager>,
    pub view: View,
    pub admin: User,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub(crate) fn with_max_depth(max_depth: usize) -> Self {
        let runtime = Arc::new(ScriptRuntime::default());
        let registry = Arc::new(TriggerRegistry::new());
        let macros = Arc::new(MacroStore::new());
        let users = Arc::new(UserDirectory::new());
        let bus = Arc::new(InProcessEventBus::new(64));
        let manager = Arc::new(
            ExecutionManager::new(
                runtime.clone(),
                Arc::clone(&registry),
                Arc::clone(&macros),
                Arc::clone(&users),
                bus.clone(),
            )
            .with_max_depth(max_depth),
        );

        let view = View::root("default").unwrap();
        registry.load_view(&view, vec![]);
        let admin = User::builder().name("root").admin(true).build().unwrap();
        users.put(admin.clone());

        Self {
            runtime,
            registry,
            macros,
            users,
            bus,
            manager,
            view,
            admin,
        }
    }

    /// Register a non-admin user allowed every path in `perms`.
    pub(crate) fn user(&self, name: &str, perms: &[&str]) -> User {
        let user = perms
            .iter()
            .fold(User::builder().name(name), |builder, path| {
                builder.rule(permission_rule(path))
            })
            .build()
            .unwrap();
        self.users.put(user.clone());
        user
    }

    pub(crate) fn macro_def(&self, name: &str, query: &str, creator: UserId) {
        self.macros.set(Macro::new(name, query, creator).unwrap());
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> NodehookError {
    NotFoundError {
        entity,
        id: id.to_string(),
    }
    .into()
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryTriggerRepo {
    store: Arc<Mutex<Vec<TriggerDef>>>,
}

impl TriggerRepository for InMemoryTriggerRepo {
    async fn create(&self, trigger: TriggerDef) -> Result<TriggerDef, NodehookError> {
        self.store.lock().unwrap().push(trigger.clone());
        Ok(trigger)
    }

    async fn get(&self, view: ViewId, id: TriggerId) -> Result<Option<TriggerDef>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().find(|t| t.view == view && t.id == id).cloned())
    }

    async fn list_by_view(&self, view: ViewId) -> Result<Vec<TriggerDef>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().filter(|t| t.view == view).cloned().collect())
    }

    async fn get_all(&self) -> Result<Vec<TriggerDef>, NodehookError> {
        Ok(self.store.lock().unwrap().clone())
    }

    async fn update(&self, trigger: TriggerDef) -> Result<TriggerDef, NodehookError> {
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|t| t.view == trigger.view && t.id == trigger.id)
            .ok_or_else(|| not_found("Trigger", trigger.id))?;
        *slot = trigger.clone();
        Ok(trigger)
    }

    async fn delete(&self, view: ViewId, id: TriggerId) -> Result<(), NodehookError> {
        self.store
            .lock()
            .unwrap()
            .retain(|t| !(t.view == view && t.id == id));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryCronRepo {
    store: Arc<Mutex<Vec<CronJob>>>,
}

impl InMemoryCronRepo {
    pub(crate) fn snapshot(&self, view: ViewId, id: CronId) -> Option<CronJob> {
        let store = self.store.lock().unwrap();
        store.iter().find(|j| j.view == view && j.id == id).cloned()
    }
}

impl CronRepository for InMemoryCronRepo {
    async fn create(&self, job: CronJob) -> Result<CronJob, NodehookError> {
        self.store.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn get(&self, view: ViewId, id: CronId) -> Result<Option<CronJob>, NodehookError> {
        Ok(self.snapshot(view, id))
    }

    async fn list_by_view(&self, view: ViewId) -> Result<Vec<CronJob>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().filter(|j| j.view == view).cloned().collect())
    }

    async fn get_enabled(&self) -> Result<Vec<CronJob>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().filter(|j| j.enabled).cloned().collect())
    }

    async fn update_definition(&self, job: CronJob) -> Result<CronJob, NodehookError> {
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|j| j.view == job.view && j.id == job.id)
            .ok_or_else(|| not_found("CronJob", job.id))?;
        let state = slot.state.clone();
        *slot = CronJob {
            state,
            ..job.clone()
        };
        Ok(slot.clone())
    }

    async fn update_state(
        &self,
        view: ViewId,
        id: CronId,
        state: RunState,
    ) -> Result<(), NodehookError> {
        let mut store = self.store.lock().unwrap();
        if let Some(job) = store.iter_mut().find(|j| j.view == view && j.id == id) {
            job.state = state;
        }
        Ok(())
    }

    async fn clear_running(&self) -> Result<u64, NodehookError> {
        let mut store = self.store.lock().unwrap();
        let mut cleared = 0;
        for job in store.iter_mut().filter(|j| j.state.running) {
            job.state.running = false;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn delete(&self, view: ViewId, id: CronId) -> Result<(), NodehookError> {
        self.store
            .lock()
            .unwrap()
            .retain(|j| !(j.view == view && j.id == id));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryMacroRepo {
    store: Arc<Mutex<Vec<Macro>>>,
}

impl MacroRepository for InMemoryMacroRepo {
    async fn upsert(&self, mac: Macro) -> Result<Macro, NodehookError> {
        let mut store = self.store.lock().unwrap();
        store.retain(|m| m.name != mac.name);
        store.push(mac.clone());
        Ok(mac)
    }

    async fn get(&self, name: &str) -> Result<Option<Macro>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().find(|m| m.name == name).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Macro>, NodehookError> {
        let mut all = self.store.lock().unwrap().clone();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete(&self, name: &str) -> Result<(), NodehookError> {
        self.store.lock().unwrap().retain(|m| m.name != name);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryDmonRepo {
    store: Arc<Mutex<Vec<Dmon>>>,
}

impl DmonRepository for InMemoryDmonRepo {
    async fn create(&self, dmon: Dmon) -> Result<Dmon, NodehookError> {
        self.store.lock().unwrap().push(dmon.clone());
        Ok(dmon)
    }

    async fn get_by_id(&self, id: DmonId) -> Result<Option<Dmon>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().find(|d| d.id == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Dmon>, NodehookError> {
        Ok(self.store.lock().unwrap().clone())
    }

    async fn update(&self, dmon: Dmon) -> Result<Dmon, NodehookError> {
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|d| d.id == dmon.id)
            .ok_or_else(|| not_found("Dmon", dmon.id))?;
        *slot = dmon.clone();
        Ok(dmon)
    }

    async fn delete(&self, id: DmonId) -> Result<(), NodehookError> {
        self.store.lock().unwrap().retain(|d| d.id != id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryViewRepo {
    store: Arc<Mutex<Vec<View>>>,
}

impl ViewRepository for InMemoryViewRepo {
    async fn create(&self, view: View) -> Result<View, NodehookError> {
        self.store.lock().unwrap().push(view.clone());
        Ok(view)
    }

    async fn get_by_id(&self, id: ViewId) -> Result<Option<View>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().find(|v| v.id == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<View>, NodehookError> {
        Ok(self.store.lock().unwrap().clone())
    }

    async fn mark_triggers_local(&self, id: ViewId) -> Result<(), NodehookError> {
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| not_found("View", id))?;
        slot.triggers_local = true;
        Ok(())
    }

    async fn mark_crons_local(&self, id: ViewId) -> Result<(), NodehookError> {
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| not_found("View", id))?;
        slot.crons_local = true;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct InMemoryUserRepo {
    store: Arc<Mutex<Vec<User>>>,
}

impl UserRepository for InMemoryUserRepo {
    async fn create(&self, user: User) -> Result<User, NodehookError> {
        self.store.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, NodehookError> {
        let store = self.store.lock().unwrap();
        Ok(store.iter().find(|u| u.id == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<User>, NodehookError> {
        Ok(self.store.lock().unwrap().clone())
    }

    async fn update(&self, user: User) -> Result<User, NodehookError> {
        let mut store = self.store.lock().unwrap();
        let slot = store
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| not_found("User", user.id))?;
        *slot = user.clone();
        Ok(user)
    }
}
