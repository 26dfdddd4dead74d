//! Cron job — a stored query bound to a wall-clock schedule.
//!
//! Jobs run as their creator in a transaction of their own. The
//! [`RunState`] is owned by the scheduler: users can change the query,
//! metadata and enabled flag but never the run-state.

mod schedule;

pub use schedule::{Recurrence, Schedule};

use serde::{Deserialize, Serialize};

use crate::error::{NodehookError, ValidationError};
use crate::id::{CronId, UserId, ViewId};
use crate::time::Timestamp;

/// Scheduler-maintained execution state of a cron job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub running: bool,
    pub last_error: Option<String>,
    pub start_count: u64,
    pub last_start: Option<Timestamp>,
    pub last_end: Option<Timestamp>,
    /// When the job is next due; `None` once a one-shot job is consumed.
    pub next_fire: Option<Timestamp>,
    /// Set after a one-shot job has run; consumed jobs are never selected.
    pub consumed: bool,
}

impl RunState {
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }
}

/// A cron job definition plus its run-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJob {
    pub id: CronId,
    pub view: ViewId,
    pub creator: UserId,
    pub enabled: bool,
    pub schedule: Schedule,
    pub query: String,
    pub name: Option<String>,
    pub doc: Option<String>,
    pub created: Timestamp,
    pub state: RunState,
}

impl CronJob {
    /// Create a builder for constructing a [`CronJob`].
    #[must_use]
    pub fn builder() -> CronJobBuilder {
        CronJobBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when the query is empty or the
    /// schedule can never fire.
    pub fn validate(&self) -> Result<(), NodehookError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        self.schedule.validate(self.created)?;
        Ok(())
    }

    /// Whether the scheduler should start this job at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.enabled
            && !self.state.running
            && !self.state.consumed
            && self.state.next_fire.is_some_and(|at| at <= now)
    }

    /// The first due instant for a job that has not run yet.
    #[must_use]
    pub fn initial_fire(&self, now: Timestamp) -> Option<Timestamp> {
        match &self.schedule {
            Schedule::Once { at } => Some(*at),
            Schedule::Recurring { rule } => rule.next_after(now),
        }
    }

    /// Mark the job as started at `now`.
    pub fn mark_started(&mut self, now: Timestamp) {
        self.state.running = true;
        self.state.start_count += 1;
        self.state.last_start = Some(now);
    }

    /// Record the outcome of a run that ended at `now` and schedule the next
    /// one. One-shot jobs become consumed.
    pub fn mark_finished(&mut self, now: Timestamp, error: Option<String>) {
        self.state.running = false;
        self.state.last_end = Some(now);
        self.state.last_error = error;
        match &self.schedule {
            Schedule::Once { .. } => {
                self.state.consumed = true;
                self.state.next_fire = None;
            }
            Schedule::Recurring { rule } => {
                self.state.next_fire = rule.next_after(now);
            }
        }
    }

    /// Copy this job into another view with fresh run-state.
    ///
    /// A consumed one-shot job stays consumed in the copy.
    #[must_use]
    pub fn copy_to(&self, view: ViewId, now: Timestamp) -> Self {
        let mut copy = Self {
            view,
            state: RunState::default(),
            ..self.clone()
        };
        if copy.schedule.is_once() && self.state.consumed {
            copy.state.consumed = true;
        } else {
            copy.state.next_fire = copy.initial_fire(now);
        }
        copy
    }
}

/// Step-by-step builder for [`CronJob`].
#[derive(Debug, Default)]
pub struct CronJobBuilder {
    id: Option<CronId>,
    view: Option<ViewId>,
    creator: Option<UserId>,
    enabled: Option<bool>,
    schedule: Option<Schedule>,
    query: Option<String>,
    name: Option<String>,
    doc: Option<String>,
    created: Option<Timestamp>,
}

impl CronJobBuilder {
    #[must_use]
    pub fn id(mut self, id: CronId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn view(mut self, view: ViewId) -> Self {
        self.view = Some(view);
        self
    }

    #[must_use]
    pub fn creator(mut self, creator: UserId) -> Self {
        self.creator = Some(creator);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Shorthand for a one-shot schedule at `at`.
    #[must_use]
    pub fn once(self, at: Timestamp) -> Self {
        self.schedule(Schedule::Once { at })
    }

    /// Shorthand for a recurring schedule.
    #[must_use]
    pub fn recurring(self, rule: Recurrence) -> Self {
        self.schedule(Schedule::Recurring { rule })
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Override the creation time (defaults to now).
    #[must_use]
    pub fn created(mut self, created: Timestamp) -> Self {
        self.created = Some(created);
        self
    }

    /// Consume the builder, validate, and return a [`CronJob`] whose first
    /// fire time is already computed.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] if the schedule is missing or
    /// can never fire, or the query is empty.
    pub fn build(self) -> Result<CronJob, NodehookError> {
        let schedule = self
            .schedule
            .ok_or(ValidationError::MissingField("schedule"))?;
        let created = self.created.unwrap_or_else(crate::time::now);
        let mut job = CronJob {
            id: self.id.unwrap_or_default(),
            view: self.view.unwrap_or_default(),
            creator: self.creator.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            schedule,
            query: self.query.unwrap_or_default(),
            name: self.name,
            doc: self.doc,
            created,
            state: RunState::default(),
        };
        job.validate()?;
        job.state.next_fire = job.initial_fire(created);
        Ok(job)
    }
}
