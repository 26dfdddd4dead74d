//! Identity resolution for automation runs.
//!
//! Triggers, cron jobs and dmons store only their creator's id. The
//! [`UserDirectory`] turns that id back into a full [`User`] at run time, so
//! rule changes and locks made after a definition was created apply to its
//! next run.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use nodehook_domain::error::{NodehookError, NotFoundError, PermissionError};
use nodehook_domain::id::UserId;
use nodehook_domain::user::{Permission, User};

/// In-memory cache of every known user, kept in sync by the user service.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<UserId, Arc<User>>>,
}

impl UserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn put(&self, user: User) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id, Arc::new(user));
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::NotFound`] for an unknown id.
    pub fn resolve(&self, id: UserId) -> Result<Arc<User>, NodehookError> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                NotFoundError {
                    entity: "User",
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// Look up a user by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<User>> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|user| user.name == name)
            .cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Fail with [`NodehookError::PermissionDenied`] unless `user` holds `perm`.
///
/// # Errors
///
/// Returns [`NodehookError::PermissionDenied`] when the user's rules do not
/// allow `perm`.
pub fn require(user: &User, perm: &Permission) -> Result<(), NodehookError> {
    if user.allowed(perm) {
        Ok(())
    } else {
        Err(PermissionError {
            user: user.name.clone(),
            perm: perm.to_string(),
        }
        .into())
    }
}

/// Like [`require`], but a definition's unlocked creator is always allowed.
///
/// # Errors
///
/// Returns [`NodehookError::PermissionDenied`] when `user` is neither the
/// creator nor holds `perm`.
pub fn require_owner_or(
    user: &User,
    creator: UserId,
    perm: &Permission,
) -> Result<(), NodehookError> {
    if user.id == creator && !user.locked {
        return Ok(());
    }
    require(user, perm)
}
