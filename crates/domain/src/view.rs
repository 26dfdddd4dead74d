//! View — an isolated read/write boundary that owns automation definitions.
//!
//! A forked view starts out *inheriting* its parent's trigger and cron
//! sets. The first local change to one of those sets gives the fork its
//! own copy (tracked by [`View::triggers_local`] / [`View::crons_local`]).

use serde::{Deserialize, Serialize};

use crate::error::{NodehookError, ValidationError};
use crate::id::ViewId;
use crate::time::Timestamp;

/// A logical view over the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub id: ViewId,
    pub name: String,
    pub parent: Option<ViewId>,
    /// Whether the trigger set is owned by this view rather than inherited.
    pub triggers_local: bool,
    /// Whether the cron set is owned by this view rather than inherited.
    pub crons_local: bool,
    pub created: Timestamp,
}

impl View {
    /// Create a root view; root views always own their definition sets.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when `name` is empty.
    pub fn root(name: impl Into<String>) -> Result<Self, NodehookError> {
        let view = Self {
            id: ViewId::new(),
            name: name.into(),
            parent: None,
            triggers_local: true,
            crons_local: true,
            created: crate::time::now(),
        };
        view.validate()?;
        Ok(view)
    }

    /// Fork `self` into a new child view that inherits its definitions.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when `name` is empty.
    pub fn fork(&self, name: impl Into<String>) -> Result<Self, NodehookError> {
        let view = Self {
            id: ViewId::new(),
            name: name.into(),
            parent: Some(self.id),
            triggers_local: false,
            crons_local: false,
            created: crate::time::now(),
        };
        view.validate()?;
        Ok(view)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when `name` is empty or a root
    /// view claims to inherit.
    pub fn validate(&self) -> Result<(), NodehookError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.parent.is_none() && !(self.triggers_local && self.crons_local) {
            return Err(ValidationError::NotAFork(self.id.to_string()).into());
        }
        Ok(())
    }
}
