//! Node references — the minimal view of graph nodes the engine needs.
//!
//! The engine never stores nodes. It only carries references to them
//! between the store, trigger conditions and query invocations.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::Timestamp;

/// A node identified by its form and primary value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub form: String,
    pub value: String,
}

impl NodeRef {
    /// Create a reference to the node `form=value`.
    #[must_use]
    pub fn new(form: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.form, self.value)
    }
}

/// Time window attached to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInterval {
    pub min: Timestamp,
    pub max: Timestamp,
}

/// Check a form name such as `inet:ipv4`.
///
/// Forms are lowercase, made of `[a-z0-9_]` parts joined by single colons.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidForm`] when the name is malformed.
pub fn validate_form(form: &str) -> Result<(), ValidationError> {
    if is_valid_path(form, ':') {
        Ok(())
    } else {
        Err(ValidationError::InvalidForm(form.to_string()))
    }
}

/// Check a full property path such as `inet:ipv4:asn`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidProp`] when the path is malformed or has
/// no property part after the form.
pub fn validate_prop_path(prop: &str) -> Result<(), ValidationError> {
    if is_valid_path(prop, ':') && prop.contains(':') {
        Ok(())
    } else {
        Err(ValidationError::InvalidProp(prop.to_string()))
    }
}

pub(crate) fn is_valid_path(text: &str, sep: char) -> bool {
    !text.is_empty()
        && text.split(sep).all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
}
