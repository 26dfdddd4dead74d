//! Cron scheduler — wall-clock driven execution of stored queries.
//!
//! Each tick scans the enabled jobs of every view, starts the due ones and
//! persists their run-state before and after the run. A job is never
//! started while a previous run of it is still going, but different jobs
//! run concurrently on the blocking pool.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;

use nodehook_domain::cron::CronJob;
use nodehook_domain::error::NodehookError;
use nodehook_domain::event::{Event, EventType};
use nodehook_domain::id::{CronId, ViewId};

use crate::clock::Clock;
use crate::execution::{ExecutionManager, Frame};
use crate::ports::{CronRepository, EventPublisher};

/// Starts due cron jobs and records their outcome.
pub struct CronScheduler<R> {
    repo: R,
    manager: Arc<ExecutionManager>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    running: Mutex<HashSet<(ViewId, CronId)>>,
}

impl<R> CronScheduler<R>
where
    R: CronRepository + Send + Sync + 'static,
{
    pub fn new(
        repo: R,
        manager: Arc<ExecutionManager>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            manager,
            publisher,
            clock,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Clear `running` flags left behind by a process that stopped mid-run,
    /// so those jobs become selectable again.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn recover(&self) -> Result<u64, NodehookError> {
        let cleared = self.repo.clear_running().await?;
        if cleared > 0 {
            tracing::warn!(count = cleared, "cleared stale running flags");
        }
        Ok(cleared)
    }

    /// Start every job due at the current time and wait for those runs to
    /// finish. Returns how many jobs were started.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the job scan fails. Failures of single
    /// jobs are recorded on the job, not returned.
    pub async fn tick(&self) -> Result<usize, NodehookError> {
        let now = self.clock.now();
        let due = self
            .repo
            .get_enabled()
            .await?
            .into_iter()
            .filter(|job| job.is_due(now));

        let mut runs: Vec<(CronJob, JoinHandle<Result<(), NodehookError>>)> = Vec::new();
        for mut job in due {
            if !self.claim(&job) {
                continue;
            }
            job.mark_started(now);
            if let Err(err) = self
                .repo
                .update_state(job.view, job.id, job.state.clone())
                .await
            {
                tracing::error!(cron_id = %job.id, error = %err, "failed to persist cron start");
                self.release(&job);
                continue;
            }
            tracing::info!(cron_id = %job.id, view = %job.view, "cron job started");
            self.publisher.publish(Event::new(
                EventType::CronStarted,
                Some(job.view),
                json!({ "cron": job.id.to_string(), "start_count": job.state.start_count }),
            ));

            let manager = Arc::clone(&self.manager);
            let (id, query, creator, view) = (job.id, job.query.clone(), job.creator, job.view);
            let handle = tokio::task::spawn_blocking(move || {
                manager
                    .run_as(Frame::Cron(id), &query, creator, view, Vec::new())
                    .map(|_| ())
            });
            runs.push((job, handle));
        }

        let started = runs.len();
        for (job, handle) in runs {
            let error = match handle.await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(err) => Some(format!("cron run aborted: {err}")),
            };
            self.finish(job, error).await;
        }
        Ok(started)
    }

    /// Tick every `period` until the task is dropped. Each tick runs in its
    /// own task so a long job never delays the next scan.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = scheduler.tick().await {
                    tracing::error!(error = %err, "cron tick failed");
                }
            });
        }
    }

    async fn finish(&self, mut job: CronJob, error: Option<String>) {
        job.mark_finished(self.clock.now(), error);
        match &job.state.last_error {
            Some(err) => {
                tracing::warn!(cron_id = %job.id, view = %job.view, error = %err, "cron job failed");
            }
            None => tracing::info!(cron_id = %job.id, view = %job.view, "cron job finished"),
        }
        if let Err(err) = self
            .repo
            .update_state(job.view, job.id, job.state.clone())
            .await
        {
            tracing::error!(cron_id = %job.id, error = %err, "failed to persist cron result");
        }
        self.release(&job);
        self.publisher.publish(Event::new(
            EventType::CronFinished,
            Some(job.view),
            json!({
                "cron": job.id.to_string(),
                "error": job.state.last_error,
                "next_fire": job.state.next_fire,
            }),
        ));
    }

    fn claim(&self, job: &CronJob) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((job.view, job.id))
    }

    fn release(&self, job: &CronJob) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(job.view, job.id));
    }
}
