//! Engine assembly and startup recovery.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use nodehook_adapter_http_axum::state::{AppState, Repositories};
use nodehook_adapter_memory::MemoryGraph;
use nodehook_adapter_storage_sqlite_sqlx::{
    SqliteCronRepository, SqliteDmonRepository, SqliteMacroRepository, SqliteTriggerRepository,
    SqliteUserRepository, SqliteViewRepository,
};
use nodehook_app::clock::SystemClock;
use nodehook_app::cron_scheduler::CronScheduler;
use nodehook_app::dmon_supervisor::DmonSupervisor;
use nodehook_app::event_bus::InProcessEventBus;
use nodehook_app::execution::ExecutionManager;
use nodehook_app::identity::UserDirectory;
use nodehook_app::macro_store::MacroStore;
use nodehook_app::services::{
    CronService, DmonService, MacroService, TriggerService, UserService, ViewService,
};
use nodehook_app::trigger_registry::TriggerRegistry;
use nodehook_domain::error::NodehookError;
use nodehook_domain::user::User;
use nodehook_domain::view::View;

use crate::config::EngineConfig;

/// The `SQLite` repositories used by the daemon.
pub struct SqliteRepositories;

impl Repositories for SqliteRepositories {
    type Triggers = SqliteTriggerRepository;
    type Crons = SqliteCronRepository;
    type Macros = SqliteMacroRepository;
    type Dmons = SqliteDmonRepository;
    type Views = SqliteViewRepository;
    type Users = SqliteUserRepository;
}

/// A fully wired engine with its HTTP state.
pub struct Daemon {
    pub state: AppState<SqliteRepositories>,
    pub scheduler: Arc<CronScheduler<SqliteCronRepository>>,
    /// Admin ensured at startup.
    pub admin: User,
    /// Root view ensured at startup.
    pub default_view: View,
    settings: EngineConfig,
}

impl Daemon {
    /// Build every component on top of `pool` and restore stored state.
    ///
    /// Stored dmons are started, so this must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a storage error if restoring stored definitions fails.
    pub async fn build(pool: SqlitePool, settings: EngineConfig) -> Result<Self, NodehookError> {
        let registry = Arc::new(TriggerRegistry::new());
        let directory = Arc::new(UserDirectory::new());
        let macro_store = Arc::new(MacroStore::new());
        let event_bus = Arc::new(InProcessEventBus::new(settings.event_bus_capacity));
        let clock = Arc::new(SystemClock);
        let manager = Arc::new(
            ExecutionManager::new(
                Arc::new(MemoryGraph::new()),
                Arc::clone(&registry),
                Arc::clone(&macro_store),
                Arc::clone(&directory),
                event_bus.clone(),
            )
            .with_max_depth(settings.max_depth),
        );

        let users = UserService::new(
            SqliteUserRepository::new(pool.clone()),
            Arc::clone(&directory),
        );
        let loaded = users.load().await?;
        let admin = users.bootstrap_admin(&settings.admin).await?;
        tracing::info!(count = loaded, admin = %admin.name, "users loaded");

        let views = ViewService::new(
            SqliteViewRepository::new(pool.clone()),
            Arc::clone(&directory),
            Arc::clone(&registry),
        );
        let default_view = views.ensure_default(&settings.default_view).await?;

        let triggers = TriggerService::new(
            SqliteTriggerRepository::new(pool.clone()),
            SqliteViewRepository::new(pool.clone()),
            Arc::clone(&registry),
            Arc::clone(&directory),
        );
        let loaded = triggers.load().await?;
        tracing::info!(count = loaded, "triggers loaded");

        let macros = MacroService::new(
            SqliteMacroRepository::new(pool.clone()),
            macro_store,
            Arc::clone(&directory),
        );
        let loaded = macros.load().await?;
        tracing::info!(count = loaded, "macros loaded");

        let crons = CronService::new(
            SqliteCronRepository::new(pool.clone()),
            SqliteViewRepository::new(pool.clone()),
            Arc::clone(&directory),
            clock.clone(),
        );
        let scheduler = Arc::new(CronScheduler::new(
            SqliteCronRepository::new(pool.clone()),
            Arc::clone(&manager),
            event_bus.clone(),
            clock,
        ));
        scheduler.recover().await?;

        let dmons = DmonService::new(
            SqliteDmonRepository::new(pool.clone()),
            SqliteViewRepository::new(pool),
            Arc::new(DmonSupervisor::new(
                Arc::clone(&manager),
                event_bus.clone(),
                settings.dmon_restart_delay(),
            )),
            Arc::clone(&directory),
        );
        let loaded = dmons.load().await?;
        tracing::info!(count = loaded, "dmons started");

        let state = AppState {
            users: Arc::new(users),
            views: Arc::new(views),
            triggers: Arc::new(triggers),
            crons: Arc::new(crons),
            macros: Arc::new(macros),
            dmons: Arc::new(dmons),
            manager,
            event_bus,
        };
        Ok(Self {
            state,
            scheduler,
            admin,
            default_view,
            settings,
        })
    }

    /// Build the HTTP router serving this engine.
    #[must_use]
    pub fn router(&self) -> Router {
        nodehook_adapter_http_axum::router::build(self.state.clone())
    }

    /// Start the periodic cron scan.
    #[must_use]
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.scheduler).run(self.settings.cron_tick()))
    }

    /// Stop every dmon.
    pub fn shutdown(&self) {
        self.state.dmons.shutdown();
    }
}
