//! Shared application state for axum handlers.

use std::sync::Arc;

use nodehook_app::event_bus::InProcessEventBus;
use nodehook_app::execution::ExecutionManager;
use nodehook_app::ports::{
    CronRepository, DmonRepository, MacroRepository, TriggerRepository, UserRepository,
    ViewRepository,
};
use nodehook_app::services::{
    CronService, DmonService, MacroService, TriggerService, UserService, ViewService,
};

/// The set of repository types a deployment plugs into the services.
///
/// Keeps handlers generic over storage without naming six type parameters
/// on every route.
pub trait Repositories: Send + Sync + 'static {
    type Triggers: TriggerRepository + Send + Sync + 'static;
    type Crons: CronRepository + Send + Sync + 'static;
    type Macros: MacroRepository + Send + Sync + 'static;
    type Dmons: DmonRepository + Send + Sync + 'static;
    type Views: ViewRepository + Send + Sync + 'static;
    type Users: UserRepository + Send + Sync + 'static;
}

/// Application state shared across all axum handlers.
///
/// `Clone` is implemented manually so the services themselves do not need
/// to be `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<R: Repositories> {
    pub users: Arc<UserService<R::Users>>,
    pub views: Arc<ViewService<R::Views>>,
    pub triggers: Arc<TriggerService<R::Triggers, R::Views>>,
    pub crons: Arc<CronService<R::Crons, R::Views>>,
    pub macros: Arc<MacroService<R::Macros>>,
    pub dmons: Arc<DmonService<R::Dmons, R::Views>>,
    /// Runs ad-hoc queries and direct macro calls.
    pub manager: Arc<ExecutionManager>,
    /// Event bus for SSE subscriptions.
    pub event_bus: Arc<InProcessEventBus>,
}

impl<R: Repositories> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            users: Arc::clone(&self.users),
            views: Arc::clone(&self.views),
            triggers: Arc::clone(&self.triggers),
            crons: Arc::clone(&self.crons),
            macros: Arc::clone(&self.macros),
            dmons: Arc::clone(&self.dmons),
            manager: Arc::clone(&self.manager),
            event_bus: Arc::clone(&self.event_bus),
        }
    }
}
