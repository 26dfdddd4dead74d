//! Macro service — use-cases for the global macro namespace.

use std::sync::Arc;

use tokio::sync::Mutex;

use nodehook_domain::error::NodehookError;
use nodehook_domain::id::UserId;
use nodehook_domain::macros::Macro;
use nodehook_domain::user::Permission;

use crate::identity::{UserDirectory, require, require_owner_or};
use crate::macro_store::MacroStore;
use crate::ports::MacroRepository;

/// Application service for macro management.
///
/// Storage is written first; the [`MacroStore`] read by running queries is
/// only updated once the write succeeded.
pub struct MacroService<R> {
    repo: R,
    store: Arc<MacroStore>,
    users: Arc<UserDirectory>,
    write_lock: Mutex<()>,
}

impl<R: MacroRepository> MacroService<R> {
    pub fn new(repo: R, store: Arc<MacroStore>, users: Arc<UserDirectory>) -> Self {
        Self {
            repo,
            store,
            users,
            write_lock: Mutex::new(()),
        }
    }

    /// Fill the store from storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn load(&self) -> Result<usize, NodehookError> {
        let macros = self.repo.get_all().await?;
        let count = macros.len();
        for mac in macros {
            self.store.set(mac);
        }
        Ok(count)
    }

    /// Create or edit a macro.
    ///
    /// Creating needs `macro.add`. Editing needs ownership or `macro.edit`;
    /// the name and creator never change. Saving an identical body and doc
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`],
    /// [`NodehookError::Validation`] for a bad name or empty query, or a
    /// storage error.
    #[tracing::instrument(skip(self, query, doc))]
    pub async fn set_macro(
        &self,
        actor: UserId,
        name: &str,
        query: &str,
        doc: Option<String>,
    ) -> Result<Macro, NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;

        let mac = match self.store.get(name) {
            Ok(mut existing) => {
                require_owner_or(&user, existing.creator, &Permission::new(["macro", "edit"]))?;
                if existing.query == query && existing.doc == doc {
                    return Ok(existing);
                }
                existing.edit(query, doc)?;
                existing
            }
            Err(NodehookError::NotFound(_)) => {
                require(&user, &Permission::new(["macro", "add"]))?;
                let mut mac = Macro::new(name, query, actor)?;
                mac.doc = doc;
                mac
            }
            Err(err) => return Err(err),
        };

        let mac = self.repo.upsert(mac).await?;
        self.store.set(mac.clone());
        tracing::info!(name = %mac.name, "macro saved");
        Ok(mac)
    }

    /// Delete a macro. Queries already running it keep their copy.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown name,
    /// [`NodehookError::PermissionDenied`] unless `actor` created it or holds
    /// `macro.del`, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_macro(&self, actor: UserId, name: &str) -> Result<(), NodehookError> {
        let user = self.users.resolve(actor)?;
        let _guard = self.write_lock.lock().await;
        let mac = self.store.get(name)?;
        require_owner_or(&user, mac.creator, &Permission::new(["macro", "del"]))?;
        self.repo.delete(name).await?;
        self.store.delete(name);
        tracing::info!(name, "macro deleted");
        Ok(())
    }

    /// Look up a macro by name.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown name.
    pub fn get_macro(&self, name: &str) -> Result<Macro, NodehookError> {
        self.store.get(name)
    }

    /// Every macro, ordered by name.
    #[must_use]
    pub fn list_macros(&self) -> Vec<Macro> {
        self.store.list()
    }
}
