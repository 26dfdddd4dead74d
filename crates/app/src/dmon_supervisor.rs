//! Dmon supervisor — keeps long-lived stored queries running.
//!
//! Every enabled dmon gets a tokio task that runs its query as the creator,
//! records the outcome, waits the restart delay and runs it again.
//! Stopping a dmon aborts its task; a query already executing on the
//! blocking pool is left to finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;

use nodehook_domain::dmon::{Dmon, DmonStatus};
use nodehook_domain::event::{Event, EventType};
use nodehook_domain::id::DmonId;

use crate::execution::{ExecutionManager, Frame};
use crate::ports::EventPublisher;

type StatusMap = Arc<Mutex<HashMap<DmonId, DmonStatus>>>;

/// Supervises the restart loops of all enabled dmons.
pub struct DmonSupervisor {
    manager: Arc<ExecutionManager>,
    publisher: Arc<dyn EventPublisher>,
    restart_delay: Duration,
    tasks: Mutex<HashMap<DmonId, JoinHandle<()>>>,
    status: StatusMap,
}

impl DmonSupervisor {
    pub fn new(
        manager: Arc<ExecutionManager>,
        publisher: Arc<dyn EventPublisher>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            manager,
            publisher,
            restart_delay,
            tasks: Mutex::new(HashMap::new()),
            status: Arc::default(),
        }
    }

    /// Start (or restart) supervision of `dmon`. Disabled dmons are stopped
    /// instead. Must be called from within a tokio runtime.
    pub fn start(&self, dmon: &Dmon) {
        if !dmon.enabled {
            self.stop(dmon.id);
            return;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = tasks.remove(&dmon.id) {
            previous.abort();
        }
        lock(&self.status).entry(dmon.id).or_default().running = true;
        tracing::info!(dmon_id = %dmon.id, name = %dmon.name, "dmon started");

        let handle = tokio::spawn(supervise(
            dmon.clone(),
            Arc::clone(&self.manager),
            Arc::clone(&self.publisher),
            Arc::clone(&self.status),
            self.restart_delay,
        ));
        tasks.insert(dmon.id, handle);
    }

    /// Stop supervising a dmon, keeping its last status.
    pub fn stop(&self, id: DmonId) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(task) = task {
            task.abort();
            tracing::info!(dmon_id = %id, "dmon stopped");
        }
        if let Some(status) = lock(&self.status).get_mut(&id) {
            status.running = false;
        }
    }

    /// Stop supervising a dmon and forget its status.
    pub fn remove(&self, id: DmonId) {
        self.stop(id);
        lock(&self.status).remove(&id);
    }

    /// Stop every dmon.
    pub fn shutdown(&self) {
        let tasks: Vec<DmonId> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        for id in tasks {
            self.stop(id);
        }
    }

    /// Current status of a dmon; never-started dmons report the default.
    #[must_use]
    pub fn status(&self, id: DmonId) -> DmonStatus {
        lock(&self.status).get(&id).cloned().unwrap_or_default()
    }
}

fn lock(status: &StatusMap) -> std::sync::MutexGuard<'_, HashMap<DmonId, DmonStatus>> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn supervise(
    dmon: Dmon,
    manager: Arc<ExecutionManager>,
    publisher: Arc<dyn EventPublisher>,
    status: StatusMap,
    restart_delay: Duration,
) {
    loop {
        let runs = {
            let mut status = lock(&status);
            let entry = status.entry(dmon.id).or_default();
            entry.runs += 1;
            entry.last_start = Some(nodehook_domain::time::now());
            entry.runs
        };

        let run_manager = Arc::clone(&manager);
        let (id, query, creator, view) = (dmon.id, dmon.query.clone(), dmon.creator, dmon.view);
        let outcome = tokio::task::spawn_blocking(move || {
            run_manager.run_as(Frame::Dmon(id), &query, creator, view, Vec::new())
        })
        .await;
        let error = match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(err) => Some(format!("dmon run aborted: {err}")),
        };

        if let Some(err) = &error {
            tracing::warn!(dmon_id = %dmon.id, runs, error = %err, "dmon run failed");
        } else {
            tracing::debug!(dmon_id = %dmon.id, runs, "dmon run finished");
        }
        {
            let mut status = lock(&status);
            let entry = status.entry(dmon.id).or_default();
            entry.last_end = Some(nodehook_domain::time::now());
            entry.last_error.clone_from(&error);
        }
        publisher.publish(Event::new(
            EventType::DmonExited,
            Some(dmon.view),
            json!({ "dmon": dmon.id.to_string(), "runs": runs, "error": error }),
        ));

        tokio::time::sleep(restart_delay).await;
    }
}
