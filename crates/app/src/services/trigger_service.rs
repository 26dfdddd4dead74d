//! Trigger service — use-cases for managing triggers.
//!
//! Every change is persisted before the registry is updated. A change made
//! in a fork that still inherits its parent's triggers first gives the fork
//! its own copies, so the parent's set is never touched from a fork.

use std::sync::Arc;

use tokio::sync::Mutex;

use nodehook_domain::error::{NodehookError, NotFoundError};
use nodehook_domain::id::{TriggerId, UserId, ViewId};
use nodehook_domain::trigger::{TriggerCondition, TriggerDef};
use nodehook_domain::user::{Permission, User};
use nodehook_domain::view::View;

use crate::identity::{UserDirectory, require, require_owner_or};
use crate::ports::{TriggerRepository, ViewRepository};
use crate::trigger_registry::{TriggerRegistry, TriggerStats};

/// Input for [`TriggerService::add_trigger`].
#[derive(Debug, Clone)]
pub struct NewTrigger {
    pub condition: TriggerCondition,
    pub query: String,
    pub name: Option<String>,
    pub doc: Option<String>,
}

/// A trigger together with its run counters.
#[derive(Debug, Clone)]
pub struct TriggerInfo {
    pub trigger: TriggerDef,
    pub stats: TriggerStats,
}

/// Application service for trigger management.
pub struct TriggerService<TR, VR> {
    repo: TR,
    views: VR,
    registry: Arc<TriggerRegistry>,
    users: Arc<UserDirectory>,
    // Serializes management calls so a fork is materialized only once.
    write_lock: Mutex<()>,
}

impl<TR, VR> TriggerService<TR, VR>
where
    TR: TriggerRepository,
    VR: ViewRepository,
{
    pub fn new(
        repo: TR,
        views: VR,
        registry: Arc<TriggerRegistry>,
        users: Arc<UserDirectory>,
    ) -> Self {
        Self {
            repo,
            views,
            registry,
            users,
            write_lock: Mutex::new(()),
        }
    }

    /// Register every view and its stored triggers with the registry.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repositories.
    pub async fn load(&self) -> Result<usize, NodehookError> {
        let mut count = 0;
        for view in self.views.get_all().await? {
            let triggers = if view.triggers_local || view.parent.is_none() {
                self.repo.list_by_view(view.id).await?
            } else {
                Vec::new()
            };
            count += triggers.len();
            self.registry.load_view(&view, triggers);
        }
        Ok(count)
    }

    /// Create a trigger in `view`, owned by `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] without `trigger.add`,
    /// [`NodehookError::Validation`] for a malformed definition (nothing is
    /// persisted), [`NodehookError::NotFound`] for an unknown view, or a
    /// storage error.
    #[tracing::instrument(skip(self, input), fields(condition = %input.condition))]
    pub async fn add_trigger(
        &self,
        actor: UserId,
        view: ViewId,
        input: NewTrigger,
    ) -> Result<TriggerDef, NodehookError> {
        let user = self.users.resolve(actor)?;
        require(&user, &Permission::new(["trigger", "add"]))?;

        let mut builder = TriggerDef::builder()
            .view(view)
            .creator(actor)
            .condition(input.condition)
            .query(input.query);
        if let Some(name) = input.name {
            builder = builder.name(name);
        }
        if let Some(doc) = input.doc {
            builder = builder.doc(doc);
        }
        let trigger = builder.build()?;

        let _guard = self.write_lock.lock().await;
        let view = self.get_view(view).await?;
        self.ensure_local(&view).await?;
        let trigger = self.repo.create(trigger).await?;
        self.registry.register(trigger.clone());
        tracing::info!(trigger_id = %trigger.id, view = %view.id, "trigger added");
        Ok(trigger)
    }

    /// Replace a trigger's query body.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown trigger,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `trigger.set`, [`NodehookError::Validation`] for an empty query, or a
    /// storage error.
    #[tracing::instrument(skip(self, query))]
    pub async fn set_query(
        &self,
        actor: UserId,
        view: ViewId,
        id: TriggerId,
        query: &str,
    ) -> Result<TriggerDef, NodehookError> {
        self.modify(actor, view, id, |trigger| {
            if trigger.query == query {
                return Ok(false);
            }
            trigger.set_query(query)?;
            Ok(true)
        })
        .await
    }

    /// Enable or disable a trigger.
    ///
    /// # Errors
    ///
    /// See [`TriggerService::set_query`].
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(
        &self,
        actor: UserId,
        view: ViewId,
        id: TriggerId,
        enabled: bool,
    ) -> Result<TriggerDef, NodehookError> {
        self.modify(actor, view, id, |trigger| {
            let changed = trigger.enabled != enabled;
            trigger.enabled = enabled;
            Ok(changed)
        })
        .await
    }

    /// Delete a trigger. A trigger already running finishes; it is never
    /// matched again.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown trigger,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `trigger.del`, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_trigger(
        &self,
        actor: UserId,
        view: ViewId,
        id: TriggerId,
    ) -> Result<(), NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let current = self.get_trigger(view, id)?;
        require_owner_or(&user, current.creator, &Permission::new(["trigger", "del"]))?;

        let view = self.get_view(view).await?;
        self.ensure_local(&view).await?;
        self.repo.delete(view.id, id).await?;
        self.registry.unregister(view.id, id);
        tracing::info!(trigger_id = %id, view = %view.id, "trigger deleted");
        Ok(())
    }

    /// Look up a trigger visible in `view`.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] when the view has no such trigger.
    pub fn get_trigger(&self, view: ViewId, id: TriggerId) -> Result<TriggerDef, NodehookError> {
        self.registry
            .get(view, id)
            .map(|trigger| (*trigger).clone())
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Trigger",
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// List the triggers visible in `view`, in creation order, with their
    /// counters.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown view.
    pub async fn list_triggers(&self, view: ViewId) -> Result<Vec<TriggerInfo>, NodehookError> {
        self.get_view(view).await?;
        Ok(self
            .registry
            .list(view)
            .into_iter()
            .map(|trigger| TriggerInfo {
                stats: self.registry.stats(&trigger),
                trigger: (*trigger).clone(),
            })
            .collect())
    }

    async fn modify<F>(
        &self,
        actor: UserId,
        view: ViewId,
        id: TriggerId,
        change: F,
    ) -> Result<TriggerDef, NodehookError>
    where
        F: FnOnce(&mut TriggerDef) -> Result<bool, NodehookError>,
    {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let mut trigger = self.get_trigger(view, id)?;
        self.authorize_set(&user, &trigger)?;
        if !change(&mut trigger)? {
            return Ok(trigger);
        }

        let view = self.get_view(view).await?;
        self.ensure_local(&view).await?;
        trigger.view = view.id;
        let trigger = self.repo.update(trigger).await?;
        self.registry.update(trigger.clone());
        Ok(trigger)
    }

    fn authorize_set(&self, user: &User, trigger: &TriggerDef) -> Result<(), NodehookError> {
        require_owner_or(user, trigger.creator, &Permission::new(["trigger", "set"]))
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

    /// Give a fork its own trigger set, persisting the copies first.
    async fn ensure_local(&self, view: &View) -> Result<(), NodehookError> {
        if self.registry.is_local(view.id) {
            return Ok(());
        }
        let copies: Vec<TriggerDef> = self
            .registry
            .list(view.id)
            .iter()
            .map(|trigger| trigger.copy_to(view.id))
            .collect();
        for copy in copies {
            self.repo.create(copy).await?;
        }
        self.views.mark_triggers_local(view.id).await?;
        let copied = self.registry.materialize(view.id).len();
        tracing::info!(view = %view.id, copied, "fork now owns its triggers");
        Ok(())
    }
}
