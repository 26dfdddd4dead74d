//! User service — use-cases for managing identities and their rules.

use std::sync::Arc;

use nodehook_domain::error::{NodehookError, NotFoundError, PermissionError, ValidationError};
use nodehook_domain::id::UserId;
use nodehook_domain::user::{Rule, User};

use crate::identity::UserDirectory;
use crate::ports::UserRepository;

/// Application service for user management. Only admins may change users.
pub struct UserService<R> {
    repo: R,
    directory: Arc<UserDirectory>,
}

impl<R: UserRepository> UserService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R, directory: Arc<UserDirectory>) -> Self {
        Self { repo, directory }
    }

    /// Fill the directory from storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn load(&self) -> Result<usize, NodehookError> {
        let users = self.repo.get_all().await?;
        let count = users.len();
        for user in users {
            self.directory.put(user);
        }
        Ok(count)
    }

    /// Return the admin named `name`, creating it if no user has that name.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn bootstrap_admin(&self, name: &str) -> Result<User, NodehookError> {
        if let Some(existing) = self.directory.find_by_name(name) {
            return Ok((*existing).clone());
        }
        let admin = User::builder().name(name).admin(true).build()?;
        let admin = self.repo.create(admin).await?;
        self.directory.put(admin.clone());
        tracing::info!(user = %admin.name, "created bootstrap admin");
        Ok(admin)
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] unless `actor` is an admin,
    /// [`NodehookError::Validation`] for an empty or taken name, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, rules))]
    pub async fn add_user(
        &self,
        actor: UserId,
        name: &str,
        admin: bool,
        rules: Vec<Rule>,
    ) -> Result<User, NodehookError> {
        self.require_admin(actor)?;
        if self.directory.find_by_name(name).is_some() {
            return Err(ValidationError::Duplicate(format!("user {name:?}")).into());
        }
        let user = rules
            .into_iter()
            .fold(User::builder().name(name).admin(admin), |builder, rule| {
                builder.rule(rule)
            })
            .build()?;
        let user = self.repo.create(user).await?;
        self.directory.put(user.clone());
        Ok(user)
    }

    /// Replace a user's rule list.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::PermissionDenied`] unless `actor` is an admin,
    /// [`NodehookError::NotFound`] for an unknown user, or a storage error.
    #[tracing::instrument(skip(self, rules))]
    pub async fn set_rules(
        &self,
        actor: UserId,
        id: UserId,
        rules: Vec<Rule>,
    ) -> Result<User, NodehookError> {
        self.modify(actor, id, |user| user.rules = rules).await
    }

    /// Grant or revoke admin status.
    ///
    /// # Errors
    ///
    /// See [`UserService::set_rules`].
    #[tracing::instrument(skip(self))]
    pub async fn set_admin(
        &self,
        actor: UserId,
        id: UserId,
        admin: bool,
    ) -> Result<User, NodehookError> {
        self.modify(actor, id, |user| user.admin = admin).await
    }

    /// Lock or unlock a user. Locked users are denied everything, including
    /// the triggers and cron jobs they created.
    ///
    /// # Errors
    ///
    /// See [`UserService::set_rules`].
    #[tracing::instrument(skip(self))]
    pub async fn set_locked(
        &self,
        actor: UserId,
        id: UserId,
        locked: bool,
    ) -> Result<User, NodehookError> {
        self.modify(actor, id, |user| user.locked = locked).await
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] when no user with `id` exists.
    pub fn get_user(&self, id: UserId) -> Result<User, NodehookError> {
        self.directory.resolve(id).map(|user| (*user).clone())
    }

    /// Look up a user by name.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] when no user is called `name`.
    pub fn find_by_name(&self, name: &str) -> Result<User, NodehookError> {
        self.directory
            .find_by_name(name)
            .map(|user| (*user).clone())
            .ok_or_else(|| {
                NotFoundError {
                    entity: "User",
                    id: name.to_string(),
                }
                .into()
            })
    }

    /// List all users.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_users(&self) -> Result<Vec<User>, NodehookError> {
        self.repo.get_all().await
    }

    async fn modify(
        &self,
        actor: UserId,
        id: UserId,
        change: impl FnOnce(&mut User),
    ) -> Result<User, NodehookError> {
        self.require_admin(actor)?;
        let mut user = self.get_user(id)?;
        change(&mut user);
        user.validate()?;
        let user = self.repo.update(user).await?;
        self.directory.put(user.clone());
        Ok(user)
    }

    fn require_admin(&self, actor: UserId) -> Result<(), NodehookError> {
        let actor = self.directory.resolve(actor)?;
        if actor.admin && !actor.locked {
            Ok(())
        } else {
            Err(PermissionError {
                user: actor.name.clone(),
                perm: "manage users".to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryUserRepo, permission_rule};

    async fn setup() -> (UserService<InMemoryUserRepo>, Arc<UserDirectory>, User) {
        let directory = Arc::new(UserDirectory::new());
        let service = UserService::new(InMemoryUserRepo::default(), Arc::clone(&directory));
        let root = service.bootstrap_admin("root").await.unwrap();
        (service, directory, root)
    }

    #[tokio::test]
    async fn should_bootstrap_admin_only_once() {
        let (service, _, root) = setup().await;
        let again = service.bootstrap_admin("root").await.unwrap();
        assert_eq!(again.id, root.id);
        assert_eq!(service.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_add_user_when_actor_is_admin() {
        let (service, directory, root) = setup().await;
        let user = service
            .add_user(root.id, "analyst", false, vec![permission_rule("node.tag")])
            .await
            .unwrap();
        assert_eq!(directory.resolve(user.id).unwrap().rules.len(), 1);
    }

    #[tokio::test]
    async fn should_reject_duplicate_user_name() {
        let (service, _, root) = setup().await;
        service.add_user(root.id, "analyst", false, vec![]).await.unwrap();
        let result = service.add_user(root.id, "analyst", false, vec![]).await;
        assert!(matches!(
            result,
            Err(NodehookError::Validation(ValidationError::Duplicate(_)))
        ));
    }

    #[tokio::test]
    async fn should_deny_user_management_to_non_admin() {
        let (service, _, root) = setup().await;
        let analyst = service
            .add_user(root.id, "analyst", false, vec![permission_rule("node")])
            .await
            .unwrap();
        let result = service.add_user(analyst.id, "other", true, vec![]).await;
        assert!(matches!(result, Err(NodehookError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn should_update_directory_when_user_locked() {
        let (service, directory, root) = setup().await;
        let analyst = service
            .add_user(root.id, "analyst", false, vec![])
            .await
            .unwrap();
        service.set_locked(root.id, analyst.id, true).await.unwrap();
        assert!(directory.resolve(analyst.id).unwrap().locked);
    }

    #[tokio::test]
    async fn should_load_users_into_directory() {
        let repo = InMemoryUserRepo::default();
        let user = User::builder().name("stored").build().unwrap();
        repo.create(user.clone()).await.unwrap();

        let directory = Arc::new(UserDirectory::new());
        let service = UserService::new(repo, Arc::clone(&directory));
        assert_eq!(service.load().await.unwrap(), 1);
        assert_eq!(service.find_by_name("stored").unwrap().id, user.id);
    }
}
