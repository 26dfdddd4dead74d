//! Trigger — a stored query bound to store mutation events.
//!
//! A trigger belongs to exactly one view and runs inline, as its creator,
//! whenever a mutation event in that view satisfies its
//! [`TriggerCondition`]. After creation only the query body, the
//! descriptive metadata and the enabled flag may change.

mod condition;

pub use condition::TriggerCondition;

use serde::{Deserialize, Serialize};

use crate::error::{NodehookError, ValidationError};
use crate::id::{TriggerId, UserId, ViewId};
use crate::time::Timestamp;

/// A trigger definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDef {
    pub id: TriggerId,
    pub view: ViewId,
    pub creator: UserId,
    pub enabled: bool,
    pub condition: TriggerCondition,
    pub query: String,
    pub name: Option<String>,
    pub doc: Option<String>,
    pub created: Timestamp,
}

impl TriggerDef {
    /// Create a builder for constructing a [`TriggerDef`].
    #[must_use]
    pub fn builder() -> TriggerDefBuilder {
        TriggerDefBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when the query is empty or the
    /// condition's target object is malformed.
    pub fn validate(&self) -> Result<(), NodehookError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        self.condition.validate()?;
        Ok(())
    }

    /// Replace the query body.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] when `query` is empty; the
    /// trigger is left unchanged.
    pub fn set_query(&mut self, query: impl Into<String>) -> Result<(), NodehookError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        self.query = query;
        Ok(())
    }

    /// Copy this definition into another view, keeping its identity.
    #[must_use]
    pub fn copy_to(&self, view: ViewId) -> Self {
        Self {
            view,
            ..self.clone()
        }
    }
}

/// Step-by-step builder for [`TriggerDef`].
#[derive(Debug, Default)]
pub struct TriggerDefBuilder {
    id: Option<TriggerId>,
    view: Option<ViewId>,
    creator: Option<UserId>,
    enabled: Option<bool>,
    condition: Option<TriggerCondition>,
    query: Option<String>,
    name: Option<String>,
    doc: Option<String>,
}

impl TriggerDefBuilder {
    #[must_use]
    pub fn id(mut self, id: TriggerId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn view(mut self, view: ViewId) -> Self {
        self.view = Some(view);
        self
    }

    #[must_use]
    pub fn creator(mut self, creator: UserId) -> Self {
        self.creator = Some(creator);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: TriggerCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Consume the builder, validate, and return a [`TriggerDef`].
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] if the condition is missing or
    /// malformed, or the query is empty.
    pub fn build(self) -> Result<TriggerDef, NodehookError> {
        let condition = self
            .condition
            .ok_or(ValidationError::MissingField("condition"))?;
        let trigger = TriggerDef {
            id: self.id.unwrap_or_default(),
            view: self.view.unwrap_or_default(),
            creator: self.creator.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            condition,
            query: self.query.unwrap_or_default(),
            name: self.name,
            doc: self.doc,
            created: crate::time::now(),
        };
        trigger.validate()?;
        Ok(trigger)
    }
}
