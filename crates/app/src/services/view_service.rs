//! View service — use-cases for creating and forking views.

use std::sync::Arc;

use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::{UserId, ViewId};
use nodehook_domain::user::Permission;
use nodehook_domain::view::View;

use crate::identity::{UserDirectory, require};
use crate::ports::ViewRepository;
use crate::trigger_registry::TriggerRegistry;

/// Application service for views.
pub struct ViewService<R> {
    repo: R,
    users: Arc<UserDirectory>,
    triggers: Arc<TriggerRegistry>,
}

impl<R: ViewRepository> ViewService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R, users: Arc<UserDirectory>, triggers: Arc<TriggerRegistry>) -> Self {
        Self {
            repo,
            users,
            triggers,
        }
    }

    /// Return the first root view, creating one named `name` when the store
    /// has no views yet.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_default(&self, name: &str) -> Result<View, NodehookError> {
        let views = self.repo.get_all().await?;
        if let Some(root) = views.into_iter().find(|view| view.parent.is_none()) {
            return Ok(root);
        }
        let view = self.repo.create(View::root(name)?).await?;
        self.triggers.load_view(&view, Vec::new());
        tracing::info!(view = %view.id, name = %view.name, "created default view");
        Ok(view)
    }

    /// Fork `parent` into a new view that inherits its triggers and cron jobs.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] without `view.add`,
    /// [`NodehookError::NotFound`] for an unknown parent, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn fork(
        &self,
        actor: UserId,
        parent: ViewId,
        name: &str,
    ) -> Result<View, NodehookError> {
        let user = self.users.resolve(actor)?;
        require(&user, &Permission::new(["view", "add"]))?;
        let parent = self.get_view(parent).await?;
        let fork = self.repo.create(parent.fork(name)?).await?;
        self.triggers.load_view(&fork, Vec::new());
        Ok(fork)
    }

    /// Look up a view by id.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] when no view with `id` exists.
    pub async fn get_view(&self, id: ViewId) -> Result<View, NodehookError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "View",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all views, parents before forks.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_views(&self) -> Result<Vec<View>, NodehookError> {
        self.repo.get_all().await
    }
}
