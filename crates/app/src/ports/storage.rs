//! Storage port — repository traits for persistence.
//!
//! Trigger and cron records are keyed by `(view, id)`: a forked view that
//! materializes its own copy of an inherited definition stores it under the
//! same id in its own view.

use std::future::Future;

use nodehook_domain::cron::{CronJob, RunState};
use nodehook_domain::dmon::Dmon;
use nodehook_domain::error::NodehookError;
use nodehook_domain::id::{CronId, DmonId, TriggerId, UserId, ViewId};
use nodehook_domain::macros::Macro;
use nodehook_domain::trigger::TriggerDef;
use nodehook_domain::user::User;
use nodehook_domain::view::View;

/// Repository for persisting [`TriggerDef`]s.
pub trait TriggerRepository {
    /// Store a new trigger.
    fn create(
        &self,
        trigger: TriggerDef,
    ) -> impl Future<Output = Result<TriggerDef, NodehookError>> + Send;

    /// Get a trigger by view and id.
    fn get(
        &self,
        view: ViewId,
        id: TriggerId,
    ) -> impl Future<Output = Result<Option<TriggerDef>, NodehookError>> + Send;

    /// Get the triggers stored in `view`, in creation order.
    fn list_by_view(
        &self,
        view: ViewId,
    ) -> impl Future<Output = Result<Vec<TriggerDef>, NodehookError>> + Send;

    /// Get every stored trigger, in creation order.
    fn get_all(&self) -> impl Future<Output = Result<Vec<TriggerDef>, NodehookError>> + Send;

    /// Update the mutable fields of an existing trigger.
    fn update(
        &self,
        trigger: TriggerDef,
    ) -> impl Future<Output = Result<TriggerDef, NodehookError>> + Send;

    /// Delete a trigger.
    fn delete(
        &self,
        view: ViewId,
        id: TriggerId,
    ) -> impl Future<Output = Result<(), NodehookError>> + Send;
}

/// Repository for persisting [`CronJob`]s and their run-state.
pub trait CronRepository {
    /// Store a new cron job, including its initial run-state.
    fn create(&self, job: CronJob) -> impl Future<Output = Result<CronJob, NodehookError>> + Send;

    /// Get a job by view and id.
    fn get(
        &self,
        view: ViewId,
        id: CronId,
    ) -> impl Future<Output = Result<Option<CronJob>, NodehookError>> + Send;

    /// Get the jobs stored in `view`, in creation order.
    fn list_by_view(
        &self,
        view: ViewId,
    ) -> impl Future<Output = Result<Vec<CronJob>, NodehookError>> + Send;

    /// Get every enabled job across all views.
    fn get_enabled(&self) -> impl Future<Output = Result<Vec<CronJob>, NodehookError>> + Send;

    /// Update the user-editable fields of a job, leaving run-state alone.
    fn update_definition(
        &self,
        job: CronJob,
    ) -> impl Future<Output = Result<CronJob, NodehookError>> + Send;

    /// Overwrite the run-state of a job. Updating a deleted job is a no-op.
    fn update_state(
        &self,
        view: ViewId,
        id: CronId,
        state: RunState,
    ) -> impl Future<Output = Result<(), NodehookError>> + Send;

    /// Clear every persisted `running` flag, returning how many were set.
    fn clear_running(&self) -> impl Future<Output = Result<u64, NodehookError>> + Send;

    /// Delete a job.
    fn delete(
        &self,
        view: ViewId,
        id: CronId,
    ) -> impl Future<Output = Result<(), NodehookError>> + Send;
}

/// Repository for persisting [`Macro`]s, keyed by name.
pub trait MacroRepository {
    /// Insert or replace a macro.
    fn upsert(&self, mac: Macro) -> impl Future<Output = Result<Macro, NodehookError>> + Send;

    /// Get a macro by name.
    fn get(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Macro>, NodehookError>> + Send;

    /// Get every macro, ordered by name.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Macro>, NodehookError>> + Send;

    /// Delete a macro by name.
    fn delete(&self, name: &str) -> impl Future<Output = Result<(), NodehookError>> + Send;
}

/// Repository for persisting [`Dmon`]s.
pub trait DmonRepository {
    fn create(&self, dmon: Dmon) -> impl Future<Output = Result<Dmon, NodehookError>> + Send;

    fn get_by_id(
        &self,
        id: DmonId,
    ) -> impl Future<Output = Result<Option<Dmon>, NodehookError>> + Send;

    fn get_all(&self) -> impl Future<Output = Result<Vec<Dmon>, NodehookError>> + Send;

    fn update(&self, dmon: Dmon) -> impl Future<Output = Result<Dmon, NodehookError>> + Send;

    fn delete(&self, id: DmonId) -> impl Future<Output = Result<(), NodehookError>> + Send;
}

/// Repository for persisting [`View`]s.
pub trait ViewRepository {
    fn create(&self, view: View) -> impl Future<Output = Result<View, NodehookError>> + Send;

    fn get_by_id(
        &self,
        id: ViewId,
    ) -> impl Future<Output = Result<Option<View>, NodehookError>> + Send;

    /// Get every view, parents before their forks.
    fn get_all(&self) -> impl Future<Output = Result<Vec<View>, NodehookError>> + Send;

    /// Flag the view as owning its trigger set. Only that column is written.
    fn mark_triggers_local(
        &self,
        id: ViewId,
    ) -> impl Future<Output = Result<(), NodehookError>> + Send;

    /// Flag the view as owning its cron set. Only that column is written.
    fn mark_crons_local(
        &self,
        id: ViewId,
    ) -> impl Future<Output = Result<(), NodehookError>> + Send;
}

/// Repository for persisting [`User`]s.
pub trait UserRepository {
    fn create(&self, user: User) -> impl Future<Output = Result<User, NodehookError>> + Send;

    fn get_by_id(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, NodehookError>> + Send;

    fn get_all(&self) -> impl Future<Output = Result<Vec<User>, NodehookError>> + Send;

    fn update(&self, user: User) -> impl Future<Output = Result<User, NodehookError>> + Send;
}
