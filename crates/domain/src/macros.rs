//! Macro — a named stored query invoked on demand.
//!
//! Macro names are unique across the whole datastore, not per view, and a
//! macro always runs as whoever invokes it.

use serde::{Deserialize, Serialize};

use crate::error::{NodehookError, ValidationError};
use crate::id::UserId;
use crate::time::Timestamp;

/// A stored, named query body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    pub name: String,
    pub creator: UserId,
    pub query: String,
    pub doc: Option<String>,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl Macro {
    /// Create a new macro.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] for an invalid name or an empty
    /// query.
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        creator: UserId,
    ) -> Result<Self, NodehookError> {
        let now = crate::time::now();
        let mac = Self {
            name: name.into(),
            creator,
            query: query.into(),
            doc: None,
            created: now,
            updated: now,
        };
        mac.validate()?;
        Ok(mac)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] for an invalid name or an empty
    /// query.
    pub fn validate(&self) -> Result<(), NodehookError> {
        validate_name(&self.name)?;
        if self.query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        Ok(())
    }

    /// Replace the body and doc, keeping the name and creator.
    ///
    /// # Errors
    ///
    /// Returns [`NodehookError::Validation`] for an empty query; the macro is
    /// left unchanged.
    pub fn edit(
        &mut self,
        query: impl Into<String>,
        doc: Option<String>,
    ) -> Result<(), NodehookError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        self.query = query;
        self.doc = doc;
        self.updated = crate::time::now();
        Ok(())
    }
}

/// Check a macro name: non-empty, no whitespace, `[A-Za-z0-9_.-]` only.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidMacroName`] otherwise.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidMacroName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_macro_with_matching_timestamps() {
        let mac = Macro::new("enrich.dns", "[ +#enriched ]", UserId::new()).unwrap();
        assert_eq!(mac.created, mac.updated);
        assert!(mac.doc.is_none());
    }

    #[test]
    fn should_reject_invalid_names() {
        for bad in ["", "has space", "semi;colon"] {
            assert!(
                Macro::new(bad, "[ +#x ]", UserId::new()).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn should_reject_empty_query() {
        assert!(matches!(
            Macro::new("ok", " ", UserId::new()),
            Err(NodehookError::Validation(ValidationError::EmptyQuery))
        ));
    }

    #[test]
    fn should_edit_body_and_doc_but_not_name() {
        let mut mac = Macro::new("enrich", "[ +#a ]", UserId::new()).unwrap();
        mac.edit("[ +#b ]", Some("adds b".to_string())).unwrap();
        assert_eq!(mac.name, "enrich");
        assert_eq!(mac.query, "[ +#b ]");
        assert_eq!(mac.doc.as_deref(), Some("adds b"));
        assert!(mac.updated >= mac.created);
    }
}
