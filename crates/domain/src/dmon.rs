//! Dmon — a supervised, long-lived stored query.

use serde::{Deserialize, Serialize};

use crate::error::{NodehookError, ValidationError};
use crate::id::{DmonId, UserId, ViewId};
use crate::time::Timestamp;

/// A background query definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dmon {
    pub id: DmonId,
    pub view: ViewId,
    pub creator: UserId,
    pub name: String,
    pub query: String,
    pub enabled: bool,
    pub created: Timestamp,
}

impl Dmon {
    /// Create a new enabled dmon.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] for an empty name or query.
    pub fn new(
        view: ViewId,
        creator: UserId,
        name: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<Self, NodehookError> {
        let dmon = Self {
            id: DmonId::new(),
            view,
            creator,
            name: name.into(),
            query: query.into(),
            enabled: true,
            created: crate::time::now(),
        };
        dmon.validate()?;
        Ok(dmon)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] for an empty name or query.
    pub fn validate(&self) -> Result<(), NodehookError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        Ok(())
    }
}

/// Runtime status of a supervised dmon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmonStatus {
    pub running: bool,
    pub runs: u64,
    pub last_error: Option<String>,
    pub last_start: Option<Timestamp>,
    pub last_end: Option<Timestamp>,
}
