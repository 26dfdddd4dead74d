//! Dmon service — use-cases for managing supervised background queries.

use std::sync::Arc;

use tokio::sync::Mutex;

use nodehook_domain::dmon::{Dmon, DmonStatus};
use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::{DmonId, UserId, ViewId};
use nodehook_domain::user::Permission;

use crate::dmon_supervisor::DmonSupervisor;
use crate::identity::{UserDirectory, require, require_owner_or};
use crate::ports::{DmonRepository, ViewRepository};

/// Application service for dmons.
pub struct DmonService<DR, VR> {
    repo: DR,
    views: VR,
    supervisor: Arc<DmonSupervisor>,
    users: Arc<UserDirectory>,
    write_lock: Mutex<()>,
}

impl<DR, VR> DmonService<DR, VR>
where
    DR: DmonRepository,
    VR: ViewRepository,
{
    pub fn new(
        repo: DR,
        views: VR,
        supervisor: Arc<DmonSupervisor>,
        users: Arc<UserDirectory>,
    ) -> Self {
        Self {
            repo,
            views,
            supervisor,
            users,
            write_lock: Mutex::new(()),
        }
    }

    /// Start supervising every stored, enabled dmon.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn load(&self) -> Result<usize, NodehookError> {
        let dmons = self.repo.get_all().await?;
        let count = dmons.len();
        for dmon in &dmons {
            self.supervisor.start(dmon);
        }
        Ok(count)
    }

    /// Create a dmon in `view` and start it.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] without `dmon.add`,
    /// [`NodehookError::NotFound`] for an unknown view,
    /// [`NodehookError::Validation`] for an empty name or query, or a
    /// storage error.
    #[tracing::instrument(skip(self, query))]
    pub async fn add_dmon(
        &self,
        actor: UserId,
        view: ViewId,
        name: &str,
        query: &str,
    ) -> Result<Dmon, NodehookError> {
        let user = self.users.resolve(actor)?;
        require(&user, &Permission::new(["dmon", "add"]))?;
        if self.views.get_by_id(view).await?.is_none() {
            return Err(NotFoundError {
                entity: "View",
                id: view.to_string(),
            }
            .into());
        }
        let dmon = Dmon::new(view, actor, name, query)?;

        let _guard = self.write_lock.lock().await;
        let dmon = self.repo.create(dmon).await?;
        self.supervisor.start(&dmon);
        Ok(dmon)
    }

    /// Enable (start) or disable (stop) a dmon.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown dmon,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `dmon.set`, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(
        &self,
        actor: UserId,
        id: DmonId,
        enabled: bool,
    ) -> Result<Dmon, NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let mut dmon = self.get_dmon(id).await?;
        require_owner_or(&user, dmon.creator, &Permission::new(["dmon", "set"]))?;
        if dmon.enabled == enabled {
            return Ok(dmon);
        }
        dmon.enabled = enabled;
        let dmon = self.repo.update(dmon).await?;
        self.supervisor.start(&dmon);
        Ok(dmon)
    }

    /// Stop and delete a dmon.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown dmon,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `dmon.del`, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_dmon(&self, actor: UserId, id: DmonId) -> Result<(), NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let dmon = self.get_dmon(id).await?;
        require_owner_or(&user, dmon.creator, &Permission::new(["dmon", "del"]))?;
        self.repo.delete(id).await?;
        self.supervisor.remove(id);
        tracing::info!(dmon_id = %id, "dmon deleted");
        Ok(())
    }

    /// Look up a dmon by id.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] when no dmon with `id` exists.
    pub async fn get_dmon(&self, id: DmonId) -> Result<Dmon, NodehookError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Dmon",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List every dmon with its supervision status.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_dmons(&self) -> Result<Vec<(Dmon, DmonStatus)>, NodehookError> {
        let dmons = self.repo.get_all().await?;
        Ok(dmons
            .into_iter()
            .map(|dmon| {
                let status = self.supervisor.status(dmon.id);
                (dmon, status)
            })
            .collect())
    }

    /// Stop supervising every dmon.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{Harness, InMemoryDmonRepo, InMemoryViewRepo};

    struct Fixture {
        harness: Harness,
        service: DmonService<InMemoryDmonRepo, InMemoryViewRepo>,
        repo: InMemoryDmonRepo,
    }

    async fn setup() -> Fixture {
        let harness = Harness::new();
        let views = InMemoryViewRepo::default();
        views.create(harness.view.clone()).await.unwrap();
        let supervisor = Arc::new(DmonSupervisor::new(
            Arc::clone(&harness.manager),
            harness.bus.clone(),
            Duration::from_millis(5),
        ));
        let repo = InMemoryDmonRepo::default();
        let service = DmonService::new(
            repo.clone(),
            views,
            supervisor,
            Arc::clone(&harness.users),
        );
        Fixture {
            harness,
            service,
            repo,
        }
    }

    async fn wait_until_ran(service: &DmonService<InMemoryDmonRepo, InMemoryViewRepo>) {
        for _ in 0..400 {
            let dmons = service.list_dmons().await.unwrap();
            if dmons.iter().all(|(_, status)| status.last_end.is_some()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("dmons did not run");
    }

    #[tokio::test]
    async fn should_persist_and_start_new_dmon() {
        let fx = setup().await;
        let dmon = fx
            .service
            .add_dmon(fx.harness.admin.id, fx.harness.view.id, "poller", "noop")
            .await
            .unwrap();

        wait_until_ran(&fx.service).await;
        let listed = fx.service.list_dmons().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, dmon);
        assert!(listed[0].1.running);
        fx.service.shutdown();
    }

    #[tokio::test]
    async fn should_deny_add_without_permission() {
        let fx = setup().await;
        let bob = fx.harness.user("bob", &["node"]);
        let result = fx
            .service
            .add_dmon(bob.id, fx.harness.view.id, "poller", "noop")
            .await;
        assert!(matches!(result, Err(NodehookError::PermissionDenied(_))));
        assert!(fx.repo.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_unknown_view() {
        let fx = setup().await;
        let result = fx
            .service
            .add_dmon(fx.harness.admin.id, ViewId::new(), "poller", "noop")
            .await;
        assert!(matches!(result, Err(NodehookError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_stop_disabled_dmon() {
        let fx = setup().await;
        let dmon = fx
            .service
            .add_dmon(fx.harness.admin.id, fx.harness.view.id, "poller", "noop")
            .await
            .unwrap();
        wait_until_ran(&fx.service).await;

        let disabled = fx
            .service
            .set_enabled(fx.harness.admin.id, dmon.id, false)
            .await
            .unwrap();

        assert!(!disabled.enabled);
        let (_, status) = fx.service.list_dmons().await.unwrap().remove(0);
        assert!(!status.running);
        assert!(!fx.service.get_dmon(dmon.id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn should_let_only_owner_or_privileged_user_delete() {
        let fx = setup().await;
        let alice = fx.harness.user("alice", &["dmon.add"]);
        let bob = fx.harness.user("bob", &[]);
        let dmon = fx
            .service
            .add_dmon(alice.id, fx.harness.view.id, "poller", "noop")
            .await
            .unwrap();

        let denied = fx.service.delete_dmon(bob.id, dmon.id).await;
        assert!(matches!(denied, Err(NodehookError::PermissionDenied(_))));

        fx.service.delete_dmon(alice.id, dmon.id).await.unwrap();
        assert!(fx.service.list_dmons().await.unwrap().is_empty());
        assert!(matches!(
            fx.service.get_dmon(dmon.id).await,
            Err(NodehookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_start_stored_dmons_on_load() {
        let fx = setup().await;
        let dmon = Dmon::new(fx.harness.view.id, fx.harness.admin.id, "feed", "noop").unwrap();
        fx.repo.create(dmon).await.unwrap();

        assert_eq!(fx.service.load().await.unwrap(), 1);
        wait_until_ran(&fx.service).await;
        fx.service.shutdown();
    }
}
