//! End-to-end automation runs against `SQLite` storage and the demo graph.

use std::sync::Arc;

use nodehook_adapter_memory::MemoryGraph;
use nodehook_adapter_storage_sqlite_sqlx::{
    Config, Database, SqliteCronRepository, SqliteMacroRepository, SqliteTriggerRepository,
    SqliteUserRepository, SqliteViewRepository,
};
use nodehook_app::clock::{Clock, ManualClock};
use nodehook_app::cron_scheduler::CronScheduler;
use nodehook_app::event_bus::InProcessEventBus;
use nodehook_app::execution::ExecutionManager;
use nodehook_app::identity::UserDirectory;
use nodehook_app::macro_store::MacroStore;
use nodehook_app::ports::CronRepository;
use nodehook_app::services::{
    CronService, MacroService, NewCronJob, NewTrigger, TriggerService, UserService, ViewService,
};
use nodehook_app::trigger_registry::TriggerRegistry;
use nodehook_domain::cron::Schedule;
use nodehook_domain::error::NodehookError;
use nodehook_domain::node::NodeRef;
use nodehook_domain::tag::TagPattern;
use nodehook_domain::time::utc;
use nodehook_domain::trigger::TriggerCondition;
use nodehook_domain::user::{Permission, Rule, User};
use nodehook_domain::view::View;

struct Engine {
    db: Database,
    graph: Arc<MemoryGraph>,
    registry: Arc<TriggerRegistry>,
    users: Arc<UserDirectory>,
    macros: Arc<MacroStore>,
    clock: Arc<ManualClock>,
    bus: Arc<InProcessEventBus>,
    manager: Arc<ExecutionManager>,
    user_service: UserService<SqliteUserRepository>,
    view: View,
    admin: User,
}

async fn start() -> Engine {
    let db = Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .unwrap();
    let graph = Arc::new(MemoryGraph::new());
    let registry = Arc::new(TriggerRegistry::new());
    let users = Arc::new(UserDirectory::new());
    let macros = Arc::new(MacroStore::new());
    let bus = Arc::new(InProcessEventBus::new(64));
    let manager = Arc::new(ExecutionManager::new(
        graph.clone(),
        Arc::clone(&registry),
        Arc::clone(&macros),
        Arc::clone(&users),
        bus.clone(),
    ));

    let user_service = UserService::new(
        SqliteUserRepository::new(db.pool().clone()),
        Arc::clone(&users),
    );
    let admin = user_service.bootstrap_admin("root").await.unwrap();
    let view = ViewService::new(
        SqliteViewRepository::new(db.pool().clone()),
        Arc::clone(&users),
        Arc::clone(&registry),
    )
    .ensure_default("default")
    .await
    .unwrap();

    Engine {
        db,
        graph,
        registry,
        users,
        macros,
        clock: Arc::new(ManualClock::new(utc(2024, 6, 1, 9, 0).unwrap())),
        bus,
        manager,
        user_service,
        view,
        admin,
    }
}

impl Engine {
    fn triggers(&self) -> TriggerService<SqliteTriggerRepository, SqliteViewRepository> {
        TriggerService::new(
            SqliteTriggerRepository::new(self.db.pool().clone()),
            SqliteViewRepository::new(self.db.pool().clone()),
            Arc::clone(&self.registry),
            Arc::clone(&self.users),
        )
    }

    fn crons(&self) -> CronService<SqliteCronRepository, SqliteViewRepository> {
        CronService::new(
            SqliteCronRepository::new(self.db.pool().clone()),
            SqliteViewRepository::new(self.db.pool().clone()),
            Arc::clone(&self.users),
            self.clock.clone(),
        )
    }

    fn scheduler(&self) -> CronScheduler<SqliteCronRepository> {
        CronScheduler::new(
            SqliteCronRepository::new(self.db.pool().clone()),
            Arc::clone(&self.manager),
            self.bus.clone(),
            self.clock.clone(),
        )
    }

    fn tags(&self, node: &NodeRef) -> Vec<String> {
        self.graph
            .node(self.view.id, node)
            .map(|data| data.tags.into_iter().collect())
            .unwrap_or_default()
    }
}

fn fqdn(value: &str) -> NodeRef {
    NodeRef::new("inet:fqdn", value)
}

#[tokio::test]
async fn should_tag_new_nodes_from_persisted_trigger() {
    let engine = start().await;
    engine
        .triggers()
        .add_trigger(
            engine.admin.id,
            engine.view.id,
            NewTrigger {
                condition: TriggerCondition::NodeAdd {
                    form: "inet:fqdn".to_string(),
                },
                query: "{ [+#cno.mal] }".to_string(),
                name: Some("flag".to_string()),
                doc: None,
            },
        )
        .await
        .unwrap();

    engine
        .manager
        .run("[ inet:fqdn=vertex.link ]", engine.admin.id, engine.view.id, vec![])
        .unwrap();
    assert_eq!(engine.tags(&fqdn("vertex.link")), ["cno", "cno.mal"]);

    // Re-adding an existing node is not a creation.
    engine
        .manager
        .run(
            "[ inet:fqdn=vertex.link -#cno.mal ]",
            engine.admin.id,
            engine.view.id,
            vec![],
        )
        .unwrap();
    assert_eq!(engine.tags(&fqdn("vertex.link")), ["cno"]);

    let info = engine.triggers().list_triggers(engine.view.id).await.unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].stats.fired, 1);
}

#[tokio::test]
async fn should_reload_triggers_into_fresh_registry() {
    let engine = start().await;
    engine
        .triggers()
        .add_trigger(
            engine.admin.id,
            engine.view.id,
            NewTrigger {
                condition: TriggerCondition::TagAdd {
                    tag: TagPattern::parse("#cno.*").unwrap(),
                    form: None,
                },
                query: "[ +#seen ]".to_string(),
                name: None,
                doc: None,
            },
        )
        .await
        .unwrap();

    let registry = Arc::new(TriggerRegistry::new());
    let service = TriggerService::new(
        SqliteTriggerRepository::new(engine.db.pool().clone()),
        SqliteViewRepository::new(engine.db.pool().clone()),
        Arc::clone(&registry),
        Arc::clone(&engine.users),
    );
    assert_eq!(service.load().await.unwrap(), 1);
    assert_eq!(registry.list(engine.view.id).len(), 1);
}

#[tokio::test]
async fn should_run_one_shot_cron_exactly_once() {
    let engine = start().await;
    let at = utc(2024, 6, 1, 9, 30).unwrap();
    let job = engine
        .crons()
        .add_job(
            engine.admin.id,
            engine.view.id,
            NewCronJob {
                schedule: Schedule::Once { at },
                query: "[ inet:fqdn=cron.example ]".to_string(),
                name: None,
                doc: None,
            },
        )
        .await
        .unwrap();

    let scheduler = engine.scheduler();
    assert_eq!(scheduler.tick().await.unwrap(), 0);

    engine.clock.set(at);
    assert_eq!(scheduler.tick().await.unwrap(), 1);
    assert!(engine.graph.node(engine.view.id, &fqdn("cron.example")).is_some());

    engine.clock.advance(chrono::Duration::hours(1));
    assert_eq!(scheduler.tick().await.unwrap(), 0);

    let stored = SqliteCronRepository::new(engine.db.pool().clone())
        .get(engine.view.id, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state.start_count, 1);
    assert!(stored.state.consumed);
    assert!(!stored.state.running);
    assert_eq!(stored.state.last_start, Some(at));
}

#[tokio::test]
async fn should_record_failing_cron_run() {
    let engine = start().await;
    let job = engine
        .crons()
        .add_job(
            engine.admin.id,
            engine.view.id,
            NewCronJob {
                schedule: Schedule::Once {
                    at: engine.clock.now(),
                },
                query: "[ inet:fqdn=partial.example ] raise".to_string(),
                name: None,
                doc: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(engine.scheduler().tick().await.unwrap(), 1);

    let stored = engine.crons().get_job(engine.view.id, job.id).await.unwrap();
    assert!(stored.state.has_error());
    assert!(
        engine
            .graph
            .node(engine.view.id, &fqdn("partial.example"))
            .is_some()
    );
}

#[tokio::test]
async fn should_run_macro_with_caller_permissions() {
    let engine = start().await;
    let service = MacroService::new(
        SqliteMacroRepository::new(engine.db.pool().clone()),
        Arc::clone(&engine.macros),
        Arc::clone(&engine.users),
    );
    service
        .set_macro(engine.admin.id, "flag", "[ +#cno.mal ]", None)
        .await
        .unwrap();
    engine
        .manager
        .run("[ inet:fqdn=vertex.link ]", engine.admin.id, engine.view.id, vec![])
        .unwrap();

    let analyst = engine
        .user_service
        .add_user(engine.admin.id, "analyst", false, vec![])
        .await
        .unwrap();
    let denied = engine.manager.run(
        "inet:fqdn=vertex.link macro.exec flag",
        analyst.id,
        engine.view.id,
        vec![],
    );
    assert!(matches!(denied, Err(NodehookError::PermissionDenied(_))));
    assert!(engine.tags(&fqdn("vertex.link")).is_empty());

    engine
        .user_service
        .set_rules(
            engine.admin.id,
            analyst.id,
            vec![Rule::allow(Permission::parse("node.tag.add.cno").unwrap())],
        )
        .await
        .unwrap();
    engine
        .manager
        .run(
            "inet:fqdn=vertex.link macro.exec flag",
            analyst.id,
            engine.view.id,
            vec![],
        )
        .unwrap();
    assert_eq!(engine.tags(&fqdn("vertex.link")), ["cno", "cno.mal"]);
}

#[tokio::test]
async fn should_run_macro_as_trigger_creator_when_other_user_writes() {
    let engine = start().await;
    MacroService::new(
        SqliteMacroRepository::new(engine.db.pool().clone()),
        Arc::clone(&engine.macros),
        Arc::clone(&engine.users),
    )
    .set_macro(engine.admin.id, "flag", "[ +#cno.mal ]", None)
    .await
    .unwrap();
    engine
        .triggers()
        .add_trigger(
            engine.admin.id,
            engine.view.id,
            NewTrigger {
                condition: TriggerCondition::NodeAdd {
                    form: "inet:fqdn".to_string(),
                },
                query: "macro.exec flag".to_string(),
                name: None,
                doc: None,
            },
        )
        .await
        .unwrap();

    let analyst = engine
        .user_service
        .add_user(
            engine.admin.id,
            "analyst",
            false,
            vec![Rule::allow(Permission::node_add("inet:fqdn"))],
        )
        .await
        .unwrap();
    engine
        .manager
        .run(
            "[ inet:fqdn=vertex.link ]",
            analyst.id,
            engine.view.id,
            vec![],
        )
        .unwrap();

    assert_eq!(engine.tags(&fqdn("vertex.link")), ["cno", "cno.mal"]);
}
