//! Cron service — use-cases for managing cron jobs.
//!
//! Cron jobs are read straight from storage: the scheduler scans the
//! repository each tick, so there is no in-memory set to keep in sync. A
//! fork that still inherits lists its parent's jobs; its first local change
//! copies them (with fresh run-state) into the fork.

use std::sync::Arc;

use tokio::sync::Mutex;

use nodehook_domain::cron::{CronJob, Schedule};
use nodehook_domain::error::{NodehookError, NotFoundError, ValidationError};
use nodehook_domain::id::{CronId, UserId, ViewId};
use nodehook_domain::user::Permission;
use nodehook_domain::view::View;

use crate::clock::Clock;
use crate::identity::{UserDirectory, require, require_owner_or};
use crate::ports::{CronRepository, ViewRepository};

/// Input for [`CronService::add_job`].
#[derive(Debug, Clone)]
pub struct NewCronJob {
    pub schedule: Schedule,
    pub query: String,
    pub name: Option<String>,
    pub doc: Option<String>,
}

/// Application service for cron job management.
pub struct CronService<CR, VR> {
    repo: CR,
    views: VR,
    users: Arc<UserDirectory>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl<CR, VR> CronService<CR, VR>
where
    CR: CronRepository,
    VR: ViewRepository,
{
    pub fn new(repo: CR, views: VR, users: Arc<UserDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            views,
            users,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a cron job in `view`, owned by `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] without `cron.add`,
    /// [`NodehookError::Validation`] for an empty query or a schedule that
    /// can never fire, [`NodehookError::NotFound`] for an unknown view, or
    /// a storage error.
    #[tracing::instrument(skip(self, input))]
    pub async fn add_job(
        &self,
        actor: UserId,
        view: ViewId,
        input: NewCronJob,
    ) -> Result<CronJob, NodehookError> {
        let user = self.users.resolve(actor)?;
        require(&user, &Permission::new(["cron", "add"]))?;

        let mut builder = CronJob::builder()
            .view(view)
            .creator(actor)
            .schedule(input.schedule)
            .query(input.query)
            .created(self.clock.now());
        if let Some(name) = input.name {
            builder = builder.name(name);
        }
        if let Some(doc) = input.doc {
            builder = builder.doc(doc);
        }
        let job = builder.build()?;

        let _guard = self.write_lock.lock().await;
        let view = self.get_view(view).await?;
        self.ensure_local(&view).await?;
        let job = self.repo.create(job).await?;
        tracing::info!(cron_id = %job.id, view = %view.id, next_fire = ?job.state.next_fire, "cron job added");
        Ok(job)
    }

    /// Replace a job's query body.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown job,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `cron.set`, [`NodehookError::Validation`] for an empty query, or a
    /// storage error.
    #[tracing::instrument(skip(self, query))]
    pub async fn set_query(
        &self,
        actor: UserId,
        view: ViewId,
        id: CronId,
        query: &str,
    ) -> Result<CronJob, NodehookError> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let mut job = self.get_job(view, id).await?;
        require_owner_or(&user, job.creator, &Permission::new(["cron", "set"]))?;
        if job.query == query {
            return Ok(job);
        }
        let job_view = self.local_view(view).await?;
        job.view = job_view;
        job.query = query.to_string();
        self.repo.update_definition(job).await
    }

    /// Enable or disable a job. Re-enabling a recurring job schedules its
    /// next run from now rather than replaying missed ones.
    ///
    /// # Errors
    ///
    /// See [`CronService::set_query`]; the permission is `cron.set`.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(
        &self,
        actor: UserId,
        view: ViewId,
        id: CronId,
        enabled: bool,
    ) -> Result<CronJob, NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let mut job = self.get_job(view, id).await?;
        require_owner_or(&user, job.creator, &Permission::new(["cron", "set"]))?;
        if job.enabled == enabled {
            return Ok(job);
        }

        job.view = self.local_view(view).await?;
        job.enabled = enabled;
        let mut job = self.repo.update_definition(job).await?;
        if enabled {
            if let Schedule::Recurring { rule } = &job.schedule {
                if !job.state.running {
                    job.state.next_fire = rule.next_after(self.clock.now());
                    self.repo
                        .update_state(job.view, job.id, job.state.clone())
                        .await?;
                }
            }
        }
        Ok(job)
    }

    /// Delete a job. A run already in progress finishes.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown job,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `cron.del`, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_job(
        &self,
        actor: UserId,
        view: ViewId,
        id: CronId,
    ) -> Result<(), NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let job = self.get_job(view, id).await?;
        require_owner_or(&user, job.creator, &Permission::new(["cron", "del"]))?;
        let job_view = self.local_view(view).await?;
        self.repo.delete(job_view, id).await?;
        tracing::info!(cron_id = %id, view = %job_view, "cron job deleted");
        Ok(())
    }

    /// Look up a job visible in `view`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown view or job.
    pub async fn get_job(&self, view: ViewId, id: CronId) -> Result<CronJob, NodehookError> {
        let owner = self.owner(view).await?;
        self.repo.get(owner, id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "CronJob",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List the jobs visible in `view`, in creation order, with run-state.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown view.
    pub async fn list_jobs(&self, view: ViewId) -> Result<Vec<CronJob>, NodehookError> {
        let owner = self.owner(view).await?;
        self.repo.list_by_view(owner).await
    }

    async fn get_view(&self, id: ViewId) -> Result<View, NodehookError> {
        self.views.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "View",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// The view whose cron set `view` currently reads.
    async fn owner(&self, view: ViewId) -> Result<ViewId, NodehookError> {
        let mut current = self.get_view(view).await?;
        loop {
            match current.parent {
                Some(parent) if !current.crons_local => {
                    current = self.get_view(parent).await?;
                }
                _ => return Ok(current.id),
            }
        }
    }

    /// Materialize `view`'s cron set if needed and return its id.
    async fn local_view(&self, view: ViewId) -> Result<ViewId, NodehookError> {
        let view = self.get_view(view).await?;
        self.ensure_local(&view).await?;
        Ok(view.id)
    }

    async fn ensure_local(&self, view: &View) -> Result<(), NodehookError> {
        let Some(parent) = view.parent else {
            return Ok(());
        };
        if view.crons_local {
            return Ok(());
        }
        let owner = self.owner(parent).await?;
        let now = self.clock.now();
        let inherited = self.repo.list_by_view(owner).await?;
        let copied = inherited.len();
        for job in inherited {
            self.repo.create(job.copy_to(view.id, now)).await?;
        }
        self.views.mark_crons_local(view.id).await?;
        tracing::info!(view = %view.id, copied, "fork now owns its cron jobs");
        Ok(())
    }
}
